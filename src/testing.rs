//! Testing view models.
//!
//! [`test_view_model`] mounts a view model the way a real view would, through the same
//! [`ViewBinding`](crate::ViewBinding), and records what happens: every snapshot the model cell
//! emits, and every render of the view.
//!
//! ```text
//! let mut host = Host::new();
//! let mut tester = test_view_model(&mut host, Counter::new);
//! tester.view_model().increment();
//! tester.pump();
//! tester.verify_n_rebuilds(1);
//! assert_eq!(tester.model_changes(), [Count(1)]);
//! ```

use crate::binding::{self, BoundView, Injected, ViewBinding};
use crate::subscription::Subscription;
use crate::view_model::{lifecycle, ViewModel};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use yubikiri_host::{Context, Host, Provider, State, View, ViewId};

/// Counts calls; stands in for a render function.
#[derive(Debug, Clone, Default)]
pub struct RenderSpy {
    calls: Rc<Cell<usize>>,
}

impl RenderSpy {
    pub fn new() -> RenderSpy {
        RenderSpy::default()
    }

    pub fn call(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    /// Calls since the last reset.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn reset(&self) {
        self.calls.set(0);
    }

    /// Asserts that there were exactly `n` calls since the last check, and resets.
    #[track_caller]
    pub fn verify_called(&self, n: usize) {
        let calls = self.calls.replace(0);
        assert_eq!(calls, n, "expected {} renders, got {}", n, calls);
    }
}

/// Provides `view_model` to every view below `child`.
///
/// Bound views of the matching type inside `child` use it instead of creating their own view
/// model, and leave its lifecycle to the caller.
pub fn provide_view_model<VM: ViewModel>(
    view_model: Rc<VM>,
    child: Arc<dyn View>,
) -> Arc<dyn View> {
    Arc::new(Provider::new(Rc::new(Injected::new(view_model)), child))
}

/// The view mounted by the harness: renders nothing but a call on its spy.
struct HarnessView<VM> {
    spy: RenderSpy,
    view_model: PhantomData<fn() -> VM>,
}

impl<VM> Clone for HarnessView<VM> {
    fn clone(&self) -> Self {
        HarnessView {
            spy: self.spy.clone(),
            view_model: PhantomData,
        }
    }
}

impl<VM> fmt::Debug for HarnessView<VM> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HarnessView")
            .field("view_model", &std::any::type_name::<VM>())
            .field("renders", &self.spy.calls())
            .finish()
    }
}

impl<VM> PartialEq for HarnessView<VM> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.spy.calls, &other.spy.calls)
    }
}

impl<VM: ViewModel> BoundView for HarnessView<VM> {
    type ViewModel = VM;

    fn create_view_model(&self, _: &Context) -> VM {
        // always mounted below provide_view_model
        panic!(
            "HarnessView<{}> has no view model of its own",
            std::any::type_name::<VM>()
        )
    }

    fn build(&self, _: &Context, _: &VM) -> Arc<dyn View> {
        self.spy.call();
        Arc::new(())
    }

    fn props(&self) -> Option<&VM::Props> {
        None
    }
}

impl<VM: ViewModel> View for HarnessView<VM> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn new_state(&self, context: &Context) -> Box<dyn State> {
        binding::mount_state(self, context)
    }

    fn body(&self, state: &dyn Any, context: &Context) -> Arc<dyn View> {
        binding::render(self, state, context)
    }

    fn eq(&self, other: &dyn View) -> bool {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self == other
        } else {
            false
        }
    }
}

/// Mounts the view model built by `create` on `host` and returns a tester for it.
pub fn test_view_model<VM, F>(host: &mut Host, create: F) -> ViewModelTester<'_, VM>
where
    VM: ViewModel,
    F: FnOnce() -> VM,
{
    test_view_model_within(host, create, |view| view)
}

/// Like [`test_view_model`], but nests the view inside whatever `parent` wraps around it, e.g.
/// providers of values the view model looks up.
pub fn test_view_model_within<VM, F, P>(
    host: &mut Host,
    create: F,
    parent: P,
) -> ViewModelTester<'_, VM>
where
    VM: ViewModel,
    F: FnOnce() -> VM,
    P: FnOnce(Arc<dyn View>) -> Arc<dyn View>,
{
    let view_model = Rc::new(create());

    let changes = Rc::new(RefCell::new(Vec::new()));
    let subscription = {
        let changes = Rc::clone(&changes);
        view_model
            .core()
            .observe()
            .subscribe(move |model: &VM::Model| changes.borrow_mut().push(model.clone()))
    };

    let spy = RenderSpy::new();
    let view: Arc<dyn View> = Arc::new(HarnessView::<VM> {
        spy: spy.clone(),
        view_model: PhantomData,
    });
    host.mount(parent(provide_view_model(Rc::clone(&view_model), view)));
    // mounting is not a rebuild
    spy.reset();

    ViewModelTester {
        host,
        view_model,
        changes,
        spy,
        _subscription: subscription,
    }
}

/// Observes a view model mounted by [`test_view_model`].
pub struct ViewModelTester<'h, VM: ViewModel> {
    host: &'h mut Host,
    view_model: Rc<VM>,
    changes: Rc<RefCell<Vec<VM::Model>>>,
    spy: RenderSpy,
    _subscription: Subscription,
}

impl<'h, VM: ViewModel> ViewModelTester<'h, VM> {
    /// The view model under test; the very instance the view is bound to.
    pub fn view_model(&self) -> &Rc<VM> {
        &self.view_model
    }

    /// The current snapshot.
    pub fn model(&self) -> VM::Model {
        self.view_model.model()
    }

    /// Every snapshot emitted since the last [`clear`](Self::clear), oldest first.
    pub fn model_changes(&self) -> Vec<VM::Model> {
        self.changes.borrow().clone()
    }

    pub fn host(&mut self) -> &mut Host {
        &mut *self.host
    }

    /// Runs one host tick. Returns the number of rendered views.
    pub fn pump(&mut self) -> usize {
        self.host.poll()
    }

    /// Runs host ticks until no renders are pending.
    #[track_caller]
    pub fn settle(&mut self) -> usize {
        match self.host.settle() {
            Ok(rendered) => rendered,
            Err(err) => panic!("{}", err),
        }
    }

    /// Asserts that the view rendered exactly `n` times since the last check.
    #[track_caller]
    pub fn verify_n_rebuilds(&self, n: usize) {
        self.spy.verify_called(n);
    }

    /// Asserts that the view did not render since the last check, and does not render once the
    /// host has settled either.
    #[track_caller]
    pub fn verify_no_more_rebuilds(&mut self) {
        self.spy.verify_called(0);
        self.settle();
        self.spy.verify_called(0);
    }

    /// Disposes the view model under test, the way its view would on unmount.
    ///
    /// The harness view stays mounted but no longer hears from the view model.
    ///
    /// # Panics
    /// Panics if the harness view is no longer mounted, or the view model is already disposed.
    #[track_caller]
    pub fn dispose(&mut self) {
        let context = match self.harness_context() {
            Some(context) => context,
            None => panic!("ViewModelTester::dispose: the harness view is not mounted"),
        };
        lifecycle::dispose(&*self.view_model, &context);
    }

    fn harness_context(&self) -> Option<Context> {
        let tree = self.host.tree();
        let mut pending: Vec<ViewId> = tree.root().into_iter().collect();
        while let Some(id) = pending.pop() {
            let binding = tree
                .state(id)
                .and_then(|state| state.as_any().downcast_ref::<ViewBinding<HarnessView<VM>>>());
            if let Some(binding) = binding {
                return Some(binding.context());
            }
            pending.extend_from_slice(tree.subviews(id));
        }
        None
    }

    /// Forgets recorded snapshots and renders.
    pub fn clear(&mut self) {
        self.changes.borrow_mut().clear();
        self.spy.reset();
    }
}

impl<'h, VM: ViewModel> fmt::Debug for ViewModelTester<'h, VM> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ViewModelTester")
            .field("model", &self.model())
            .field("changes", &*self.changes.borrow())
            .field("renders", &self.spy.calls())
            .finish()
    }
}
