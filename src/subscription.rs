//! Observer registrations and the handles that revoke them.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

/// The registered observers of one source, in subscription order.
pub(crate) struct Observers<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
    disposed: bool,
}

pub(crate) type SharedObservers<T> = Rc<RefCell<Observers<T>>>;

impl<T: 'static> Observers<T> {
    pub(crate) fn new() -> SharedObservers<T> {
        Rc::new(RefCell::new(Observers {
            next_id: 0,
            entries: Vec::new(),
            disposed: false,
        }))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    fn take(&mut self, id: u64) -> Option<Entry<T>> {
        let pos = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub(crate) fn subscribe(
        this: &SharedObservers<T>,
        callback: impl Fn(&T) + 'static,
    ) -> Result<Subscription> {
        let id = {
            let mut observers = this.borrow_mut();
            if observers.disposed {
                return Err(Error::Disposed);
            }
            let id = observers.next_id;
            observers.next_id += 1;
            observers.entries.push(Entry {
                id,
                callback: Rc::new(callback),
            });
            id
        };
        let weak = Rc::downgrade(this);
        let source: Weak<dyn Source> = weak;
        Ok(Subscription {
            source: Some(source),
            id,
        })
    }

    /// Calls every observer with `value`, in subscription order. Returns how many were called.
    ///
    /// No borrow is held while an observer runs, so observers may subscribe, revoke (themselves
    /// or others) and dispose. An observer revoked earlier in the same round is not called.
    pub(crate) fn notify(this: &SharedObservers<T>, value: &T) -> usize {
        Observers::notify_while(this, value, || true)
    }

    /// Like [`notify`](Observers::notify), but stops the round as soon as `current` returns
    /// false, i.e. once `value` has been superseded by an observer.
    pub(crate) fn notify_while(
        this: &SharedObservers<T>,
        value: &T,
        current: impl Fn() -> bool,
    ) -> usize {
        let round: Vec<(u64, Callback<T>)> = this
            .borrow()
            .entries
            .iter()
            .map(|entry| (entry.id, Rc::clone(&entry.callback)))
            .collect();

        let mut called = 0;
        for (id, callback) in round {
            if !current() {
                break;
            }
            if !this.borrow().contains(id) {
                continue;
            }
            callback(value);
            called += 1;
        }
        called
    }

    /// Drops all observers; later subscriptions fail.
    pub(crate) fn dispose(this: &SharedObservers<T>) {
        let entries = {
            let mut observers = this.borrow_mut();
            observers.disposed = true;
            mem::take(&mut observers.entries)
        };
        // callbacks may own subscriptions to this very source
        drop(entries);
    }
}

/// Type-erased view of an observer list, so handles don't carry the value type.
trait Source {
    fn remove(&self, id: u64);
    fn contains(&self, id: u64) -> bool;
}

impl<T: 'static> Source for RefCell<Observers<T>> {
    fn remove(&self, id: u64) {
        let removed = self.borrow_mut().take(id);
        drop(removed);
    }

    fn contains(&self, id: u64) -> bool {
        self.borrow().contains(id)
    }
}

/// A revocable observer registration.
///
/// Revoking is idempotent: the first [`revoke`](Subscription::revoke) removes the registration,
/// every later one does nothing. It is also fine to revoke after the source was disposed or
/// dropped, and from inside the very notification being delivered.
///
/// Dropping the handle revokes it.
#[must_use = "dropping a Subscription revokes it"]
pub struct Subscription {
    source: Option<Weak<dyn Source>>,
    id: u64,
}

impl Subscription {
    pub fn revoke(&mut self) {
        if let Some(source) = self.source.take().and_then(|source| source.upgrade()) {
            source.remove(self.id);
        }
    }

    /// Returns true while the observer is still registered with a live source.
    pub fn is_active(&self) -> bool {
        self.source
            .as_ref()
            .and_then(Weak::upgrade)
            .map_or(false, |source| source.contains(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
