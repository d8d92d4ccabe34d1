//! Binding mounted views to their view models.

use crate::subscription::Subscription;
use crate::view_model::{lifecycle, ViewModel};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};
use yubikiri_host::{Context, State, View};

/// The model snapshot type of a bound view.
pub type ModelOf<V> = <<V as BoundView>::ViewModel as ViewModel>::Model;

/// A view whose body is rendered from a view model.
///
/// Implement this and wire it into the host with [`impl_bound_view`](crate::impl_bound_view).
/// The host then keeps a [`ViewBinding`] as the view’s state, which creates the view model once
/// per mount and renders the view again whenever the model changes.
pub trait BoundView: Clone + fmt::Debug + 'static {
    type ViewModel: ViewModel;

    /// Creates the view model. Called exactly once per mount, unless an ancestor injects one.
    fn create_view_model(&self, context: &Context) -> Self::ViewModel;

    /// Called when the model changed, before the view renders again.
    fn on_model_change(&self, context: &Context, old: &ModelOf<Self>, new: &ModelOf<Self>) {
        let _ = (context, old, new);
    }

    /// Renders the view. Read the snapshot from the view model.
    fn build(&self, context: &Context, view_model: &Self::ViewModel) -> Arc<dyn View>;

    /// The props handed to [`ViewModel::did_update_props`] when this view is replaced by a newer
    /// version of itself. Views without props for their view model return `None`.
    fn props(&self) -> Option<&<Self::ViewModel as ViewModel>::Props>;
}

/// A pre-built view model, provided through the context so that views of matching type use it
/// instead of creating their own.
///
/// See [`testing::provide_view_model`](crate::testing::provide_view_model).
pub struct Injected<VM>(Rc<VM>);

impl<VM: ViewModel> Injected<VM> {
    pub fn new(view_model: Rc<VM>) -> Injected<VM> {
        Injected(view_model)
    }

    pub fn view_model(&self) -> &Rc<VM> {
        &self.0
    }
}

impl<VM> fmt::Debug for Injected<VM> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Injected")
            .field(&std::any::type_name::<VM>())
            .finish()
    }
}

fn injected<VM: ViewModel>(context: &Context) -> Option<Rc<VM>> {
    context
        .get::<Injected<VM>>()
        .map(|injected| Rc::clone(&injected.0))
}

/// What the notification callbacks share with the binding.
struct Shared<V: BoundView> {
    view: RefCell<V>,
    /// The last snapshot seen.
    model: RefCell<ModelOf<V>>,
    context: RefCell<Context>,
}

impl<V: BoundView> Shared<V> {
    fn model_changed(&self, new: &ModelOf<V>) {
        let context = self.context.borrow().clone();
        let old = self.model.borrow().clone();
        trace!(view = ?context.id(), "model changed: {:?} -> {:?}", old, new);
        self.view.borrow().on_model_change(&context, &old, new);
        *self.model.borrow_mut() = new.clone();
        context.request_render();
    }

    fn refresh_requested(&self) {
        let context = self.context.borrow();
        trace!(view = ?context.id(), "forced reload");
        context.request_render();
    }
}

/// The view state of a [`BoundView`]: ties one mounted view to one view model.
///
/// - on mount it takes the injected view model, or creates and initializes its own
/// - it follows the model cell and the refresh channel, requesting renders on both
/// - it forwards dependency and props changes to the view model
/// - on unmount it revokes both subscriptions and then disposes the view model it created
///
/// Injected view models belong to whoever injected them and are never disposed here.
pub struct ViewBinding<V: BoundView> {
    shared: Rc<Shared<V>>,
    view_model: Rc<V::ViewModel>,
    injected: bool,
    model_subscription: Option<Subscription>,
    refresh_subscription: Option<Subscription>,
}

impl<V: BoundView> ViewBinding<V> {
    /// Mounts `view`.
    pub fn mount(view: &V, context: &Context) -> ViewBinding<V> {
        let (view_model, injected) = match injected::<V::ViewModel>(context) {
            Some(view_model) => {
                debug!(view = ?context.id(), "mounting with injected view model");
                (view_model, true)
            }
            None => {
                debug!(view = ?context.id(), "mounting {:?}", view);
                let view_model = Rc::new(view.create_view_model(context));
                lifecycle::init(&*view_model, context);
                (view_model, false)
            }
        };

        let shared = Rc::new(Shared {
            view: RefCell::new(view.clone()),
            model: RefCell::new(view_model.model()),
            context: RefCell::new(context.clone()),
        });
        let mut binding = ViewBinding {
            shared,
            view_model,
            injected,
            model_subscription: None,
            refresh_subscription: None,
        };
        binding.subscribe();
        binding
    }

    pub fn view_model(&self) -> &Rc<V::ViewModel> {
        &self.view_model
    }

    /// The last snapshot this binding has seen.
    pub fn model(&self) -> ModelOf<V> {
        self.shared.model.borrow().clone()
    }

    /// The context of the mounted view.
    pub fn context(&self) -> Context {
        self.shared.context.borrow().clone()
    }

    /// Returns true if the view model was provided from outside.
    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// Returns true while the binding follows its view model.
    pub fn is_subscribed(&self) -> bool {
        let active =
            |sub: &Option<Subscription>| sub.as_ref().map_or(false, Subscription::is_active);
        active(&self.model_subscription) && active(&self.refresh_subscription)
    }

    fn subscribe(&mut self) {
        self.unsubscribe();
        let core = self.view_model.core();

        let shared = Rc::clone(&self.shared);
        self.model_subscription = Some(
            core.observe()
                .subscribe(move |model| shared.model_changed(model)),
        );

        let shared = Rc::clone(&self.shared);
        self.refresh_subscription = Some(
            core.refreshes()
                .subscribe(move || shared.refresh_requested()),
        );
    }

    fn unsubscribe(&mut self) {
        if let Some(mut sub) = self.model_subscription.take() {
            sub.revoke();
        }
        if let Some(mut sub) = self.refresh_subscription.take() {
            sub.revoke();
        }
    }

    /// Switches to the view model provided by an ancestor.
    fn rebind(&mut self, view_model: Rc<V::ViewModel>, context: &Context) {
        debug!(view = ?context.id(), "binding injected view model");
        self.unsubscribe();
        let previous = std::mem::replace(&mut self.view_model, view_model);
        if !self.injected {
            // the view model this binding created has nobody else to dispose it
            lifecycle::dispose(&*previous, context);
        }
        self.injected = true;
        *self.shared.model.borrow_mut() = self.view_model.model();
        self.subscribe();
    }
}

impl<V: BoundView> State for ViewBinding<V> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn did_change_dependencies(&mut self, context: &Context) {
        *self.shared.context.borrow_mut() = context.clone();
        match injected::<V::ViewModel>(context) {
            Some(view_model) if Rc::ptr_eq(&view_model, &self.view_model) => {}
            Some(view_model) => self.rebind(view_model, context),
            None if self.injected => {
                trace!(view = ?context.id(), "injected view model is no longer provided");
            }
            None => lifecycle::change_dependencies(&*self.view_model, context),
        }
    }

    fn will_update(&mut self, update: &dyn View, context: &Context) {
        let new = match update.as_any().downcast_ref::<V>() {
            Some(new) => new.clone(),
            None => return,
        };
        let old = self.shared.view.replace(new);
        let new = self.shared.view.borrow();
        if let (Some(old_props), Some(new_props)) = (old.props(), new.props()) {
            trace!(view = ?context.id(), "props changed");
            lifecycle::update_props(&*self.view_model, old_props, new_props);
        }
    }

    fn will_unmount(&mut self, context: &Context) {
        self.unsubscribe();
        if self.injected {
            debug!(view = ?context.id(), "unmounting; injected view model stays with its owner");
        } else {
            lifecycle::dispose(&*self.view_model, context);
        }
    }
}

impl<V: BoundView> fmt::Debug for ViewBinding<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ViewBinding")
            .field("view", &*self.shared.view.borrow())
            .field("model", &*self.shared.model.borrow())
            .field("injected", &self.injected)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Creates the state of a bound view; the body of [`View::new_state`] for bound views.
pub fn mount_state<V: BoundView>(view: &V, context: &Context) -> Box<dyn State> {
    Box::new(ViewBinding::mount(view, context))
}

/// Renders a bound view; the body of [`View::body`] for bound views.
pub fn render<V: BoundView>(view: &V, state: &dyn Any, context: &Context) -> Arc<dyn View> {
    match state.downcast_ref::<ViewBinding<V>>() {
        Some(binding) => view.build(context, binding.view_model()),
        None => panic!(
            "View::body: invalid state for {}; expected a ViewBinding",
            std::any::type_name::<V>()
        ),
    }
}

/// Implements the host `View` trait for a [`BoundView`].
///
/// Assumes that `PartialEq` is implemented; it decides whether the view model is told about new
/// props.
///
/// Syntax:
///
/// ```text
/// impl_bound_view! {
///     StructName;
///     (put extra items like key() here, using normal rust syntax)
/// }
/// ```
#[macro_export]
macro_rules! impl_bound_view {
    (
        $(#[$attr:meta])*
        $struct:ty;
        $($extra:tt)*
    ) => {
        $(#[$attr])*
        impl $crate::host::View for $struct {
            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn new_state(
                &self,
                context: &$crate::host::Context,
            ) -> Box<dyn $crate::host::State> {
                $crate::binding::mount_state(self, context)
            }

            fn body(
                &self,
                state: &dyn ::core::any::Any,
                context: &$crate::host::Context,
            ) -> ::std::sync::Arc<dyn $crate::host::View> {
                $crate::binding::render(self, state, context)
            }

            fn eq(&self, other: &dyn $crate::host::View) -> bool {
                if let Some(other) = other.as_any().downcast_ref::<$struct>() {
                    self == other
                } else {
                    false
                }
            }

            $($extra)*
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_model::{Phase, ViewModelCore};
    use std::cell::Cell;
    use yubikiri_host::{Host, Provider};

    /// Everything that happened, in order.
    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Greeter {
        core: ViewModelCore<String>,
        log: Log,
    }

    impl Greeter {
        fn greet(&self, name: &str) {
            self.core.update_model(format!("hello {}", name));
        }

        fn reload(&self) {
            self.core.force_reload_view();
        }
    }

    impl ViewModel for Greeter {
        type Model = String;
        type Props = GreeterView;

        fn core(&self) -> &ViewModelCore<String> {
            &self.core
        }

        fn init(&self, _: &Context) {
            self.log.borrow_mut().push("init".into());
            self.greet("init");
        }

        fn did_change_dependencies(&self, _: &Context) {
            self.log.borrow_mut().push("deps".into());
        }

        fn did_update_props(&self, old: &GreeterView, new: &GreeterView) {
            self.log
                .borrow_mut()
                .push(format!("props {} -> {}", old.salt, new.salt));
        }

        fn dispose(&self, _: &Context) {
            self.log.borrow_mut().push("dispose".into());
        }
    }

    #[derive(Debug, Clone)]
    struct GreeterView {
        salt: u32,
        log: Log,
        factory_calls: Rc<Cell<usize>>,
    }

    impl PartialEq for GreeterView {
        fn eq(&self, other: &GreeterView) -> bool {
            self.salt == other.salt
        }
    }

    impl BoundView for GreeterView {
        type ViewModel = Greeter;

        fn create_view_model(&self, _: &Context) -> Greeter {
            self.factory_calls.set(self.factory_calls.get() + 1);
            Greeter {
                core: ViewModelCore::new(String::new()),
                log: Rc::clone(&self.log),
            }
        }

        fn on_model_change(&self, _: &Context, old: &String, new: &String) {
            self.log
                .borrow_mut()
                .push(format!("change {:?} -> {:?}", old, new));
        }

        fn build(&self, _: &Context, view_model: &Greeter) -> Arc<dyn View> {
            self.log
                .borrow_mut()
                .push(format!("build {:?}", view_model.model()));
            Arc::new(())
        }

        fn props(&self) -> Option<&GreeterView> {
            Some(self)
        }
    }

    crate::impl_bound_view! {
        GreeterView;
    }

    fn greeter_view(salt: u32) -> GreeterView {
        GreeterView {
            salt,
            log: Log::default(),
            factory_calls: Rc::new(Cell::new(0)),
        }
    }

    fn greeter(model: &str) -> Rc<Greeter> {
        Rc::new(Greeter {
            core: ViewModelCore::new(String::from(model)),
            log: Log::default(),
        })
    }

    fn provided(view_model: &Rc<Greeter>, view: &GreeterView) -> Arc<dyn View> {
        Arc::new(Provider::new(
            Rc::new(Injected::new(Rc::clone(view_model))),
            Arc::new(view.clone()),
        ))
    }

    /// Injects a view model into its child's context, or nothing.
    #[derive(Debug)]
    struct MaybeInjected {
        injected: Option<Rc<Injected<Greeter>>>,
        child: Arc<dyn View>,
    }

    impl View for MaybeInjected {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn body(&self, _: &dyn Any, _: &Context) -> Arc<dyn View> {
            Arc::clone(&self.child)
        }

        fn eq(&self, other: &dyn View) -> bool {
            match other.as_any().downcast_ref::<MaybeInjected>() {
                Some(other) => {
                    let same_injected = match (&self.injected, &other.injected) {
                        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    };
                    same_injected && self.child.eq(&*other.child)
                }
                None => false,
            }
        }

        fn subview_context(&self, _: &dyn Any, context: &Context) -> Option<Context> {
            self.injected
                .as_ref()
                .map(|injected| context.with(Rc::clone(injected)))
        }
    }

    fn take(log: &Log) -> Vec<String> {
        log.borrow_mut().drain(..).collect()
    }

    fn binding(host: &Host) -> &ViewBinding<GreeterView> {
        let tree = host.tree();
        let mut id = tree.root().expect("nothing mounted");
        loop {
            let state = tree.state(id).expect("missing state");
            if let Some(binding) = state.as_any().downcast_ref::<ViewBinding<GreeterView>>() {
                return binding;
            }
            id = tree.subviews(id)[0];
        }
    }

    #[test]
    fn mount_inits_then_follows_the_model() {
        let view = greeter_view(0);
        let mut host = Host::new();
        host.mount(Arc::new(view.clone()));

        assert_eq!(view.factory_calls.get(), 1);
        assert_eq!(
            take(&view.log),
            ["init", "deps", "build \"hello init\""],
            "init runs before the first render and may update the model"
        );
        assert_eq!(binding(&host).model(), "hello init");

        let view_model = Rc::clone(binding(&host).view_model());
        view_model.greet("you");
        assert_eq!(
            take(&view.log),
            ["change \"hello init\" -> \"hello you\""],
            "rendering waits for the host"
        );
        assert_eq!(binding(&host).model(), "hello you");
        assert_eq!(host.poll(), 1);
        assert_eq!(take(&view.log), ["build \"hello you\""]);

        view_model.greet("you");
        assert_eq!(host.poll(), 0, "equal snapshot, no render");
        assert!(take(&view.log).is_empty());
    }

    #[test]
    fn provided_value_change_reaches_the_view_model() {
        let view = greeter_view(0);
        let theme = Rc::new(1u8);
        let mut host = Host::new();
        host.mount(Arc::new(Provider::new(Rc::clone(&theme), Arc::new(view.clone()))));
        take(&view.log);

        host.set_root(Arc::new(Provider::new(Rc::clone(&theme), Arc::new(view.clone()))))
            .unwrap();
        assert!(take(&view.log).is_empty(), "same provided value");

        host.set_root(Arc::new(Provider::new(Rc::new(2u8), Arc::new(view.clone()))))
            .unwrap();
        assert_eq!(take(&view.log), ["deps", "build \"hello init\""]);
        assert_eq!(view.factory_calls.get(), 1);
        assert_eq!(binding(&host).view_model().core().phase(), Phase::Initialized);
    }

    #[test]
    fn injecting_over_an_owned_view_model_disposes_it() {
        let view = greeter_view(0);
        let mut host = Host::new();
        host.mount(Arc::new(MaybeInjected {
            injected: None,
            child: Arc::new(view.clone()),
        }));
        let owned = Rc::clone(binding(&host).view_model());
        assert!(!binding(&host).is_injected());
        take(&view.log);

        let injected = greeter("injected");
        host.set_root(Arc::new(MaybeInjected {
            injected: Some(Rc::new(Injected::new(Rc::clone(&injected)))),
            child: Arc::new(view.clone()),
        }))
        .unwrap();

        assert_eq!(take(&view.log), ["dispose", "build \"injected\""]);
        assert_eq!(owned.core().phase(), Phase::Disposed);
        assert!(owned.core().observe().is_disposed());
        assert!(Rc::ptr_eq(binding(&host).view_model(), &injected));
        assert!(binding(&host).is_injected());
        assert_eq!(binding(&host).model(), "injected");

        injected.greet("later");
        assert_eq!(host.poll(), 1);
        assert_eq!(
            take(&view.log),
            ["change \"injected\" -> \"hello later\"", "build \"hello later\""]
        );
    }

    #[test]
    fn cached_model_follows_a_nested_update() {
        let view = greeter_view(0);
        let injected = greeter("start");

        // registered before the binding, so it runs first in every round
        let _upgrade = {
            let weak = Rc::downgrade(&injected);
            injected.core().observe().subscribe(move |model: &String| {
                if let Some(view_model) = weak.upgrade() {
                    if model == "hello draft" {
                        view_model.greet("final");
                    }
                }
            })
        };

        let mut host = Host::new();
        host.mount(provided(&injected, &view));
        take(&view.log);

        injected.greet("draft");
        assert_eq!(host.settle(), Ok(1));
        assert_eq!(binding(&host).model(), injected.model());
        assert_eq!(binding(&host).model(), "hello final");
        assert_eq!(
            take(&view.log),
            ["change \"start\" -> \"hello final\"", "build \"hello final\""]
        );
    }

    #[test]
    fn forced_reload_renders_without_model_change() {
        let view = greeter_view(0);
        let mut host = Host::new();
        host.mount(Arc::new(view.clone()));
        take(&view.log);

        binding(&host).view_model().reload();
        assert_eq!(host.poll(), 1);
        assert_eq!(take(&view.log), ["build \"hello init\""]);
    }

    #[test]
    fn new_props_reach_the_view_model() {
        let view = greeter_view(0);
        let mut host = Host::new();
        host.mount(Arc::new(view.clone()));
        take(&view.log);

        let newer = GreeterView { salt: 1, ..view.clone() };
        host.set_root(Arc::new(newer)).unwrap();
        assert_eq!(take(&view.log), ["props 0 -> 1", "build \"hello init\""]);
        assert_eq!(view.factory_calls.get(), 1, "the view model is kept");
    }

    #[test]
    fn unmount_revokes_then_disposes() {
        let view = greeter_view(0);
        let mut host = Host::new();
        host.mount(Arc::new(view.clone()));
        let view_model = Rc::clone(binding(&host).view_model());
        take(&view.log);

        host.unmount();
        assert_eq!(take(&view.log), ["dispose"]);
        assert_eq!(view_model.core().phase(), Phase::Disposed);
        assert!(view_model.core().observe().is_disposed());
        assert!(view_model.core().try_update_model(String::from("late")).is_err());
        assert_eq!(host.poll(), 0);
        assert!(take(&view.log).is_empty(), "nothing reaches the unmounted view");
    }

    #[test]
    fn injected_view_model_replaces_the_factory() {
        let view = greeter_view(0);
        let injected = greeter("injected");

        let mut host = Host::new();
        host.mount(provided(&injected, &view));

        assert_eq!(view.factory_calls.get(), 0);
        assert_eq!(
            injected.core().phase(),
            Phase::Constructed,
            "injected view models are not initialized"
        );
        assert!(Rc::ptr_eq(binding(&host).view_model(), &injected));
        assert!(binding(&host).is_injected());
        assert!(binding(&host).is_subscribed());
        assert_eq!(take(&view.log), ["build \"injected\""]);

        injected.greet("test");
        assert_eq!(host.poll(), 1);
        assert_eq!(
            take(&view.log),
            ["change \"injected\" -> \"hello test\"", "build \"hello test\""]
        );

        host.unmount();
        assert!(take(&injected.log).is_empty(), "not disposed by the binding");
        assert_eq!(injected.core().phase(), Phase::Constructed);
        injected.greet("after");
        assert!(take(&view.log).is_empty());
    }

    #[test]
    fn swapping_the_injected_view_model_rebinds() {
        let view = greeter_view(0);
        let first = greeter("first");
        let second = greeter("second");

        let mut host = Host::new();
        host.mount(provided(&first, &view));
        take(&view.log);

        host.set_root(provided(&second, &view)).unwrap();
        assert_eq!(take(&view.log), ["build \"second\""]);
        assert!(Rc::ptr_eq(binding(&host).view_model(), &second));
        assert_eq!(binding(&host).model(), "second");

        first.greet("stale");
        assert_eq!(host.poll(), 0, "the old view model is no longer followed");
        second.greet("fresh");
        assert_eq!(host.poll(), 1);
        assert_eq!(first.core().phase(), Phase::Constructed);
    }
}
