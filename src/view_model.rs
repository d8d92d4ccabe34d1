use crate::cell::{ReadOnlyCell, ValueCell};
use crate::error::{Error, Result};
use crate::refresh::{RefreshChannel, RefreshListener};
use std::cell::Cell;
use std::fmt;
use yubikiri_host::Context;
use tracing::debug;

/// Where a view model is in its life.
///
/// Phases only move forward: `Constructed` → `Initialized` → `Disposed`. A view model that is
/// handed to a view from outside (see [`Injected`](crate::Injected)) may go straight from
/// `Constructed` to `Disposed`, or never leave `Constructed` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Constructed,
    Initialized,
    Disposed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Phase::Constructed => "constructed",
            Phase::Initialized => "initialized",
            Phase::Disposed => "disposed",
        })
    }
}

/// The state every view model embeds: the current model snapshot, the refresh channel and the
/// lifecycle phase.
///
/// `update_model` and `force_reload_view` are meant for the view model’s own methods; views only
/// read the snapshot.
pub struct ViewModelCore<T> {
    model: ValueCell<T>,
    refresh: RefreshChannel,
    phase: Cell<Phase>,
}

impl<T: Clone + PartialEq + 'static> ViewModelCore<T> {
    pub fn new(initial: T) -> ViewModelCore<T> {
        ViewModelCore {
            model: ValueCell::new(initial),
            refresh: RefreshChannel::new(),
            phase: Cell::new(Phase::Constructed),
        }
    }

    /// The current snapshot.
    pub fn model(&self) -> T {
        self.model.get()
    }

    /// Accesses the current snapshot without cloning it.
    pub fn with_model<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.model.with(f)
    }

    /// A read-only handle to the snapshot cell, for observing changes.
    pub fn observe(&self) -> ReadOnlyCell<T> {
        self.model.read_only()
    }

    /// The listening end of the refresh channel.
    pub fn refreshes(&self) -> RefreshListener {
        self.refresh.listener()
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Replaces the snapshot. Does nothing (and returns false) if it is equal to the current one.
    ///
    /// This is the only way to change what a bound view shows.
    ///
    /// # Panics
    /// Panics if the view model has been disposed.
    #[track_caller]
    pub fn update_model(&self, model: T) -> bool {
        match self.try_update_model(model) {
            Ok(changed) => changed,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_update_model(&self, model: T) -> Result<bool> {
        self.ensure_live("update the model of")?;
        self.model.try_set(model)
    }

    /// Makes the bound view render again although the snapshot did not change.
    ///
    /// Prefer [`update_model`](Self::update_model); this is an escape hatch for state that lives
    /// outside the snapshot.
    ///
    /// # Panics
    /// Panics if the view model has been disposed.
    #[track_caller]
    pub fn force_reload_view(&self) {
        if let Err(err) = self.try_force_reload_view() {
            panic!("{}", err);
        }
    }

    pub fn try_force_reload_view(&self) -> Result<()> {
        self.ensure_live("reload the view of")?;
        self.refresh.try_emit().map(|_| ())
    }

    fn ensure_live(&self, op: &'static str) -> Result<()> {
        match self.phase.get() {
            Phase::Disposed => Err(Error::Lifecycle {
                op,
                phase: Phase::Disposed,
            }),
            _ => Ok(()),
        }
    }

    /// Moves to `to` if the current phase is one of `from`.
    fn transition(&self, op: &'static str, from: &[Phase], to: Phase) -> Result<()> {
        let phase = self.phase.get();
        if !from.contains(&phase) {
            return Err(Error::Lifecycle { op, phase });
        }
        self.phase.set(to);
        Ok(())
    }

    fn release(&self) {
        self.model.dispose_all();
        self.refresh.dispose_all();
    }
}

impl<T: fmt::Debug> fmt::Debug for ViewModelCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ViewModelCore")
            .field("model", &self.model)
            .field("refresh", &self.refresh)
            .field("phase", &self.phase.get())
            .finish()
    }
}

/// Business logic that owns a model snapshot and is bound to a view.
///
/// Implementors embed a [`ViewModelCore`] and return it from [`core`](ViewModel::core). The
/// lifecycle hooks default to doing nothing; implement them to acquire and release whatever the
/// view model needs. The hooks are called by the view binding, in this order:
///
/// - `init`: once, before the first render
/// - `did_change_dependencies`: right after `init`, and whenever values provided by ancestors
///   change
/// - `did_update_props`: whenever the view is re-created with new props while this view model
///   is kept
/// - `dispose`: once, when the view goes away; the snapshot cell and refresh channel are
///   released right after it returns
///
/// Hooks take `&self`; keep mutable state in `Cell`s or `RefCell`s, the way the snapshot itself
/// is kept.
pub trait ViewModel: 'static {
    /// The snapshot type. Equality must be structural.
    type Model: Clone + PartialEq + fmt::Debug + 'static;

    /// The externally supplied configuration of the bound view.
    type Props: 'static;

    fn core(&self) -> &ViewModelCore<Self::Model>;

    fn init(&self, context: &Context) {
        let _ = context;
    }

    fn did_change_dependencies(&self, context: &Context) {
        let _ = context;
    }

    fn did_update_props(&self, old: &Self::Props, new: &Self::Props) {
        let _ = (old, new);
    }

    fn dispose(&self, context: &Context) {
        let _ = context;
    }

    /// The current snapshot.
    fn model(&self) -> Self::Model {
        self.core().model()
    }
}

/// Lifecycle driving, for the view binding.
///
/// These check the phase before calling the hook and panic on invalid transitions: calling
/// anything on a disposed view model is a bug in the caller.
pub(crate) mod lifecycle {
    use super::*;

    #[track_caller]
    fn check(result: Result<()>) {
        if let Err(err) = result {
            panic!("{}", err);
        }
    }

    #[track_caller]
    pub(crate) fn init<VM: ViewModel>(view_model: &VM, context: &Context) {
        check(view_model.core().transition(
            "initialize",
            &[Phase::Constructed],
            Phase::Initialized,
        ));
        debug!(view = ?context.id(), "initializing view model");
        view_model.init(context);
    }

    #[track_caller]
    pub(crate) fn change_dependencies<VM: ViewModel>(view_model: &VM, context: &Context) {
        check(view_model.core().ensure_live("change the dependencies of"));
        view_model.did_change_dependencies(context);
    }

    #[track_caller]
    pub(crate) fn update_props<VM: ViewModel>(view_model: &VM, old: &VM::Props, new: &VM::Props) {
        check(view_model.core().ensure_live("update the props of"));
        view_model.did_update_props(old, new);
    }

    #[track_caller]
    pub(crate) fn dispose<VM: ViewModel>(view_model: &VM, context: &Context) {
        let core = view_model.core();
        check(core.ensure_live("dispose"));
        debug!(view = ?context.id(), phase = %core.phase(), "disposing view model");
        view_model.dispose(context);
        core.phase.set(Phase::Disposed);
        core.release();
    }
}
