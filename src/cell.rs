//! Change-notifying cells.
//!
//! A [`ValueCell`] holds one value and tells its observers whenever that value is replaced by a
//! different one. Equality is decided by `PartialEq`, so a `Vec` (or any other list) snapshot that
//! is element-wise equal to the current one is not a change. Nested fields compare however their
//! own `PartialEq` says; cells never look deeper than that.
//!
//! The owner keeps the `ValueCell` and is the only one able to `set`; everyone else gets a
//! [`ReadOnlyCell`] and can only read and subscribe.

use crate::error::{Error, Result};
use crate::subscription::{Observers, SharedObservers, Subscription};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::trace;

struct Shared<T> {
    value: RefCell<T>,
    /// Number of value-changing sets.
    version: Cell<u64>,
    observers: SharedObservers<T>,
}

impl<T: Clone + PartialEq + 'static> Shared<T> {
    fn get(&self) -> T {
        self.value.borrow().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    fn is_disposed(&self) -> bool {
        self.observers.borrow().is_disposed()
    }

    fn try_subscribe(&self, callback: impl Fn(&T) + 'static) -> Result<Subscription> {
        Observers::subscribe(&self.observers, callback)
    }
}

/// A value with change notification.
///
/// # Invariants
///
/// 1. `set(v)` where `v == current` is a no-op: nothing is stored and nobody is notified.
/// 2. Any other `set` stores the value and notifies all observers synchronously, in subscription
///    order, before returning. If an observer sets a different value meanwhile, the remaining
///    observers get only that newer value.
/// 3. `version` increments by exactly 1 on each value-changing `set`.
///
/// Observers run without any borrow held: they may read the cell, set it again, or revoke their
/// own subscription.
pub struct ValueCell<T> {
    shared: Rc<Shared<T>>,
}

impl<T: Clone + PartialEq + 'static> ValueCell<T> {
    pub fn new(value: T) -> ValueCell<T> {
        ValueCell {
            shared: Rc::new(Shared {
                value: RefCell::new(value),
                version: Cell::new(0),
                observers: Observers::new(),
            }),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.shared.get()
    }

    /// Accesses the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.shared.with(f)
    }

    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    /// Replaces the value. Returns false if it was equal to the current one.
    ///
    /// # Panics
    /// Panics if the cell has been disposed.
    #[track_caller]
    pub fn set(&self, value: T) -> bool {
        match self.try_set(value) {
            Ok(changed) => changed,
            Err(err) => panic!("ValueCell::set: {}", err),
        }
    }

    pub fn try_set(&self, value: T) -> Result<bool> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        {
            let mut current = self.shared.value.borrow_mut();
            if *current == value {
                trace!(version = self.shared.version.get(), "equal value, not notifying");
                return Ok(false);
            }
            *current = value;
        }
        let version = self.shared.version.get() + 1;
        self.shared.version.set(version);

        // observers get their own copy so they are free to set the cell again; a nested set
        // delivers its newer value to everyone, so this round ends there
        let value = self.get();
        let shared = &self.shared;
        let notified =
            Observers::notify_while(&shared.observers, &value, || shared.version.get() == version);
        trace!(version, notified, "value replaced");
        Ok(true)
    }

    /// Registers an observer for value changes.
    ///
    /// # Panics
    /// Panics if the cell has been disposed.
    #[track_caller]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        match self.try_subscribe(callback) {
            Ok(subscription) => subscription,
            Err(err) => panic!("ValueCell::subscribe: {}", err),
        }
    }

    pub fn try_subscribe(&self, callback: impl Fn(&T) + 'static) -> Result<Subscription> {
        self.shared.try_subscribe(callback)
    }

    /// Returns a handle that can read and subscribe, but not set.
    pub fn read_only(&self) -> ReadOnlyCell<T> {
        ReadOnlyCell {
            shared: Rc::clone(&self.shared),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Drops all observers and makes further `set` and `subscribe` calls fail.
    ///
    /// The last value stays readable.
    pub fn dispose_all(&self) {
        Observers::dispose(&self.shared.observers);
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("value", &*self.shared.value.borrow())
            .field("version", &self.shared.version.get())
            .finish()
    }
}

/// A read-only handle to a [`ValueCell`].
///
/// Cloning the handle shares the same cell.
pub struct ReadOnlyCell<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for ReadOnlyCell<T> {
    fn clone(&self) -> Self {
        ReadOnlyCell {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + 'static> ReadOnlyCell<T> {
    pub fn get(&self) -> T {
        self.shared.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.shared.with(f)
    }

    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    /// # Panics
    /// Panics if the cell has been disposed.
    #[track_caller]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        match self.try_subscribe(callback) {
            Ok(subscription) => subscription,
            Err(err) => panic!("ReadOnlyCell::subscribe: {}", err),
        }
    }

    pub fn try_subscribe(&self, callback: impl Fn(&T) + 'static) -> Result<Subscription> {
        self.shared.try_subscribe(callback)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReadOnlyCell")
            .field("value", &*self.shared.value.borrow())
            .field("version", &self.shared.version.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recording<T: Clone + PartialEq + 'static>(
        cell: &ValueCell<T>,
    ) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let sub = cell.subscribe(move |value: &T| seen_clone.borrow_mut().push(value.clone()));
        (seen, sub)
    }

    #[test]
    fn set_notifies_with_new_value() {
        let cell = ValueCell::new(0);
        let (seen, _sub) = recording(&cell);

        assert!(cell.set(1));
        assert!(!cell.set(1));
        assert!(cell.set(2));
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(cell.get(), 2);
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn element_wise_equal_list_is_not_a_change() {
        let first = vec![String::from("a"), String::from("b")];
        let cell = ValueCell::new(first.clone());
        let (seen, _sub) = recording(&cell);

        let copy: Vec<String> = first.iter().cloned().collect();
        assert!(!cell.set(copy));
        assert!(seen.borrow().is_empty());
        assert_eq!(cell.version(), 0);
    }

    #[test]
    fn notification_order_is_subscription_order() {
        let cell = ValueCell::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let subs: Vec<Subscription> = ['A', 'B', 'C']
            .iter()
            .map(|name| {
                let log = Rc::clone(&log);
                let name = *name;
                cell.subscribe(move |_| log.borrow_mut().push(name))
            })
            .collect();

        cell.set(1);
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
        drop(subs);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn observer_may_read_and_set_again() {
        let cell = Rc::new(ValueCell::new(0));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _sub = {
            let cell_ref = Rc::clone(&cell);
            let seen = Rc::clone(&seen);
            cell.subscribe(move |value: &i32| {
                seen.borrow_mut().push((*value, cell_ref.get()));
                if *value == 1 {
                    cell_ref.set(10);
                }
            })
        };

        cell.set(1);
        assert_eq!(*seen.borrow(), vec![(1, 1), (10, 10)]);
        assert_eq!(cell.get(), 10);
        // the cycle through the observer is broken by disposing
        cell.dispose_all();
    }

    #[test]
    fn later_observers_never_see_a_superseded_value() {
        let cell = Rc::new(ValueCell::new(0));

        // bumps odd values to the next even one
        let _bump = {
            let cell_ref = Rc::downgrade(&cell);
            cell.subscribe(move |value: &i32| {
                if let Some(cell) = cell_ref.upgrade() {
                    if value % 2 == 1 {
                        cell.set(value + 1);
                    }
                }
            })
        };
        let (seen, _sub) = recording(&cell);

        cell.set(1);
        assert_eq!(*seen.borrow(), vec![2], "1 was superseded before it reached us");
        assert_eq!(cell.get(), 2);
        assert_eq!(cell.version(), 2);

        cell.set(4);
        assert_eq!(*seen.borrow(), vec![2, 4]);
    }

    #[test]
    fn disposed_cell_rejects_set_and_subscribe() {
        let cell = ValueCell::new(1);
        let (seen, sub) = recording(&cell);
        cell.dispose_all();

        assert!(cell.is_disposed());
        assert!(!sub.is_active());
        assert_eq!(cell.try_set(2), Err(Error::Disposed));
        assert!(cell.try_subscribe(|_| {}).is_err());
        assert_eq!(cell.get(), 1, "last value stays readable");
        assert!(seen.borrow().is_empty());
    }

    #[test]
    #[should_panic(expected = "cell has been disposed")]
    fn set_after_dispose_panics() {
        let cell = ValueCell::new(1);
        cell.dispose_all();
        cell.set(2);
    }

    #[test]
    fn read_only_shares_the_cell() {
        let cell = ValueCell::new("a");
        let view = cell.read_only();
        let count = Rc::new(Cell::new(0));
        let _sub = {
            let count = Rc::clone(&count);
            view.clone().subscribe(move |_| count.set(count.get() + 1))
        };

        cell.set("b");
        assert_eq!(view.get(), "b");
        assert_eq!(view.version(), 1);
        assert_eq!(view.with(|value| value.len()), 1);
        assert_eq!(count.get(), 1);

        cell.dispose_all();
        assert!(view.is_disposed());
    }

    proptest! {
        #[test]
        fn setting_an_equal_value_never_notifies(values in proptest::collection::vec(0u8..4, 1..32)) {
            let cell = ValueCell::new(values[0]);
            let (seen, _sub) = recording(&cell);

            let mut current = values[0];
            let mut expected = Vec::new();
            for value in values.iter().skip(1) {
                let changed = cell.set(*value);
                prop_assert_eq!(changed, *value != current);
                if changed {
                    expected.push(*value);
                    current = *value;
                }
            }
            prop_assert_eq!(&*seen.borrow(), &expected);
            prop_assert_eq!(cell.version(), expected.len() as u64);
        }

        #[test]
        fn equal_lists_never_notify(list in proptest::collection::vec(any::<i16>(), 0..16)) {
            let cell = ValueCell::new(list.clone());
            let (seen, _sub) = recording(&cell);
            prop_assert!(!cell.set(list.iter().copied().collect::<Vec<_>>()));
            prop_assert!(seen.borrow().is_empty());
        }
    }
}
