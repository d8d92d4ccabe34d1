use crate::error::{Error, Result};
use crate::subscription::{Observers, SharedObservers, Subscription};
use std::fmt;
use std::rc::Rc;

/// A broadcast channel of payload-free "render again" events.
///
/// Unlike a [`ValueCell`](crate::ValueCell), every emission reaches the listeners; there is no
/// value to compare.
pub struct RefreshChannel {
    observers: SharedObservers<()>,
}

impl RefreshChannel {
    pub fn new() -> RefreshChannel {
        RefreshChannel {
            observers: Observers::new(),
        }
    }

    /// Notifies every listener.
    ///
    /// # Panics
    /// Panics if the channel has been disposed.
    #[track_caller]
    pub fn emit(&self) {
        if let Err(err) = self.try_emit() {
            panic!("RefreshChannel::emit: {}", err);
        }
    }

    /// Notifies every listener and returns how many there were.
    pub fn try_emit(&self) -> Result<usize> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(Observers::notify(&self.observers, &()))
    }

    /// Returns a handle that can listen, but not emit.
    pub fn listener(&self) -> RefreshListener {
        RefreshListener {
            observers: Rc::clone(&self.observers),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.observers.borrow().is_disposed()
    }

    /// Drops all listeners and makes further emissions fail.
    pub fn dispose_all(&self) {
        Observers::dispose(&self.observers);
    }
}

impl Default for RefreshChannel {
    fn default() -> RefreshChannel {
        RefreshChannel::new()
    }
}

impl fmt::Debug for RefreshChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let observers = self.observers.borrow();
        f.debug_struct("RefreshChannel")
            .field("listeners", &observers.len())
            .field("disposed", &observers.is_disposed())
            .finish()
    }
}

/// The listening end of a [`RefreshChannel`].
#[derive(Clone)]
pub struct RefreshListener {
    observers: SharedObservers<()>,
}

impl RefreshListener {
    /// # Panics
    /// Panics if the channel has been disposed.
    #[track_caller]
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        match self.try_subscribe(callback) {
            Ok(subscription) => subscription,
            Err(err) => panic!("RefreshListener::subscribe: {}", err),
        }
    }

    pub fn try_subscribe(&self, callback: impl Fn() + 'static) -> Result<Subscription> {
        Observers::subscribe(&self.observers, move |_: &()| callback())
    }
}

impl fmt::Debug for RefreshListener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RefreshListener").finish()
    }
}
