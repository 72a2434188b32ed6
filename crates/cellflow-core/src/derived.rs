#![forbid(unsafe_code)]

//! Read-only values recomputed from other observables.
//!
//! # Design
//!
//! [`Derived<T>`] wraps an internal [`Observable<T>`] that only its upstream
//! observers may write. The value is computed eagerly at construction and
//! again on every upstream notification; the derived cell's own comparator
//! decides whether the new result is worth notifying about.
//!
//! Ownership points upstream: the derived cell owns its subscriptions on
//! the sources, while the closures registered with the sources only hold a
//! `Weak` back to the derived cell. Dropping every handle (and every
//! subscription) on a derived value therefore frees it and unsubscribes it
//! from its sources, and no reference cycle is ever formed.
//!
//! # Invariants
//!
//! 1. `get()` returns `mapper(current source value, ..)` after every
//!    upstream notification has been delivered.
//! 2. The mapper receives the previous source value on every call but the
//!    first.
//! 3. Subscribers are notified only when the comparator reports a change.
//!
//! # Failure Modes
//!
//! - **Mapper panics**: the panic is isolated by the source's fan-out; the
//!   derived value keeps its last result.
//! - **Source dropped**: cannot happen while the derived value is alive,
//!   because the derived value's subscription keeps the source alive.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::comparator::Comparator;
use crate::config::NotifyConfig;
use crate::id::ObservableId;
use crate::observable::Observable;
use crate::observer::Observer;
use crate::source::Source;
use crate::subscription::Subscription;

/// A read-only value derived from one or more sources.
///
/// Cloning a `Derived` creates a new handle to the **same** value.
pub struct Derived<T> {
    cell: Observable<T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.cell).finish()
    }
}

impl<T: Clone + 'static> Derived<T> {
    pub(crate) fn from_cell(cell: Observable<T>) -> Self {
        Self { cell }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    /// Identity of this value.
    #[must_use]
    pub fn id(&self) -> ObservableId {
        self.cell.id()
    }

    /// Number of recomputations that produced a changed value.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count()
    }

    /// Subscribe a closure.
    pub fn subscribe(&self, observer: impl Fn(&T, ObservableId) + 'static) -> Subscription {
        self.cell.subscribe(observer)
    }

    /// Subscribe an object observer by weak reference.
    pub fn subscribe_observer<O: Observer<T> + 'static>(&self, observer: &Rc<O>) -> Subscription {
        self.cell.subscribe_observer(observer)
    }

    /// Release every upstream subscription now. The value is frozen at its
    /// last result; existing subscribers stay registered but never fire
    /// again.
    pub fn destroy(&self) {
        let released = self.cell.release_upstream();
        tracing::debug!(observable = %self.cell.id(), released, "derived value destroyed");
    }

    /// Whether the value still follows at least one source.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.cell.upstream_count() > 0
    }
}

impl<T: Clone + 'static> Source<T> for Derived<T> {
    fn id(&self) -> ObservableId {
        self.cell.id()
    }

    fn current(&self) -> T {
        self.cell.get()
    }

    fn config(&self) -> NotifyConfig {
        self.cell.config()
    }

    fn subscribe_dyn(&self, observer: Rc<dyn Observer<T>>) -> Subscription {
        self.cell.subscribe_dyn(observer)
    }

    fn subscribe_weak_dyn(&self, observer: Weak<dyn Observer<T>>) -> Subscription {
        self.cell.subscribe_weak_dyn(observer)
    }
}

/// Derive a value from `source`, notifying when the result changes by
/// `PartialEq`.
///
/// The mapper is called with the current source value and, on every call
/// after the first, the source value it replaced.
pub fn derive<S, R>(
    source: &impl Source<S>,
    mapper: impl Fn(&S, Option<&S>) -> R + 'static,
) -> Derived<R>
where
    S: Clone + 'static,
    R: Clone + PartialEq + 'static,
{
    derive_with(source, mapper, Comparator::equal())
}

/// Derive a value from `source` with a custom comparator for the result.
pub fn derive_with<S, R>(
    source: &impl Source<S>,
    mapper: impl Fn(&S, Option<&S>) -> R + 'static,
    comparator: Comparator<R>,
) -> Derived<R>
where
    S: Clone + 'static,
    R: Clone + 'static,
{
    let current = source.current();
    let cell = Observable::with_config(mapper(&current, None), comparator, source.config());

    let weak_cell = cell.downgrade();
    let previous = RefCell::new(current);
    let sub = source.subscribe_dyn(Rc::new(move |value: &S, _: ObservableId| {
        let Some(cell) = Observable::upgrade(&weak_cell) else {
            return;
        };
        let prior = previous.replace(value.clone());
        cell.publish(mapper(value, Some(&prior)));
    }));
    cell.attach(sub);

    Derived::from_cell(cell)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn derive_updates_correctly() {
        let source = Observable::new(6);
        let val = derive(&source, |v, _| v + 7);
        assert_eq!(val.get(), 13);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = val.subscribe(move |v: &i32, id| sink.borrow_mut().push((*v, id)));

        source.set(8);
        assert_eq!(*seen.borrow(), vec![(15, val.id())]);
        assert_eq!(val.get(), 15);
    }

    #[test]
    fn mapper_receives_previous_value() {
        let source = Observable::new(1);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let _val = derive(&source, move |v: &i32, prev: Option<&i32>| {
            sink.borrow_mut().push((*v, prev.copied()));
            *v
        });
        source.set(2);
        source.set(5);
        assert_eq!(*calls.borrow(), vec![(1, None), (2, Some(1)), (5, Some(2))]);
    }

    #[test]
    fn comparator_damps_propagation() {
        let source = Observable::new(10);
        let parity = derive(&source, |v, _| v % 2);
        let hits = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&hits);
        let _sub = parity.subscribe(move |_: &i32, _| counter.set(counter.get() + 1));

        source.set(12);
        source.set(14);
        assert_eq!(hits.get(), 0);
        source.set(15);
        assert_eq!(hits.get(), 1);
        assert_eq!(parity.version(), 1);
    }

    #[test]
    fn chained_derivations() {
        let a = Observable::new(2);
        let b = derive(&a, |v, _| v * 10);
        let c = derive(&b, |v, _| v + 1);
        assert_eq!(c.get(), 21);
        a.set(3);
        assert_eq!(c.get(), 31);
    }

    #[test]
    fn intermediate_survives_while_downstream_lives() {
        let a = Observable::new(1);
        let c = {
            let b = derive(&a, |v, _| v * 2);
            derive(&b, |v, _| v + 1)
        };
        // `b` has no handle left, but `c`'s subscription keeps it alive.
        a.set(5);
        assert_eq!(c.get(), 11);
    }

    #[test]
    fn dropping_derived_unsubscribes_from_source() {
        let source = Observable::new(1);
        let val = derive(&source, |v, _| *v);
        assert_eq!(source.subscriber_count(), 1);
        drop(val);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn destroy_releases_upstream() {
        let source = Observable::new(1);
        let val = derive(&source, |v, _| v * 3);
        assert!(val.is_live());
        val.destroy();
        assert!(!val.is_live());
        assert_eq!(source.subscriber_count(), 0);

        source.set(4);
        assert_eq!(val.get(), 3);
    }

    #[test]
    fn derived_inherits_source_config() {
        let config = NotifyConfig::default().with_max_depth(3);
        let source = Observable::with_config(0, Comparator::equal(), config);
        let val = derive(&source, |v, _| *v);
        assert_eq!(Source::config(&val), config);
    }

    #[test]
    fn panicking_mapper_keeps_last_value() {
        let source = Observable::new(1);
        let val = derive(&source, |v: &i32, _| {
            assert!(*v < 100, "mapper rejects large values");
            *v
        });
        source.set(500);
        assert_eq!(val.get(), 1);
        source.set(7);
        assert_eq!(val.get(), 7);
    }
}
