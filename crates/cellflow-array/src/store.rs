#![forbid(unsafe_code)]

//! Element-backed storage shared by every array type.
//!
//! # Design
//!
//! [`ArrayCore<T>`] owns the ordered list of [`Element`] boxes plus a cached
//! [`Snapshot<T>`] of their values. Reads are served from the snapshot; the
//! snapshot is rebuilt by [`notify_changes`](ArrayCore::notify_changes),
//! which every mutation ends with.
//!
//! Two registries hang off the core:
//!
//! - **dependents**: derived arrays, held weakly. They receive an
//!   [`ArrayChange`] (the new element order plus the ids of the elements
//!   whose value changed) so they can recompute incrementally.
//! - **observers**: ordinary value subscribers, receiving the full snapshot.
//!
//! Dependents are notified first, so by the time a value observer runs,
//! every array derived from this one is already up to date.
//!
//! # Invariants
//!
//! 1. After `notify_changes`, `value()` equals the element values in order.
//! 2. No internal borrow is held while dependents or observers run.

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use cellflow_core::error::Result as CellResult;
use cellflow_core::{
    Comparator, Detach, NotifyConfig, ObservableId, Observer, Observers, Source, SubscriberKey,
    Subscription,
};
use tracing::trace;

use crate::element::{Element, ElementId};
use crate::mapped::{MappedArray, Mapper};

/// Immutable view of an array's values at one point in time.
pub type Snapshot<T> = Rc<[T]>;

/// Ids of elements whose value changed in one edit.
pub type ElementSet = AHashSet<ElementId>;

/// What a derived array learns about an edit of its source.
pub struct ArrayChange<T> {
    /// The source's elements, in their new order.
    pub elements: Rc<[Rc<Element<T>>]>,
    /// Elements whose value changed. Empty for pure reshuffles.
    pub changed: Rc<ElementSet>,
}

impl<T> ArrayChange<T> {
    /// Whether `id` was flagged as changed.
    #[must_use]
    pub fn is_changed(&self, id: ElementId) -> bool {
        self.changed.contains(&id)
    }
}

impl<T> Clone for ArrayChange<T> {
    fn clone(&self) -> Self {
        Self {
            elements: Rc::clone(&self.elements),
            changed: Rc::clone(&self.changed),
        }
    }
}

/// Ordered element storage with change fan-out.
pub struct ArrayCore<T> {
    id: ObservableId,
    elements: RefCell<Vec<Rc<Element<T>>>>,
    snapshot: RefCell<Snapshot<T>>,
    comparator: Comparator<T>,
    observers: Observers<Snapshot<T>>,
    dependents: Observers<ArrayChange<T>>,
    /// Subscriptions on whatever this array is built from.
    upstream: RefCell<Vec<Subscription>>,
}

impl<T: fmt::Debug> fmt::Debug for ArrayCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayCore")
            .field("id", &self.id)
            .field("value", &&**self.snapshot.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> ArrayCore<T> {
    pub(crate) fn new(
        values: impl IntoIterator<Item = T>,
        comparator: Comparator<T>,
        config: NotifyConfig,
    ) -> Self {
        let elements = values.into_iter().map(Element::new).collect();
        Self::from_elements(elements, comparator, config)
    }

    pub(crate) fn from_elements(
        elements: Vec<Rc<Element<T>>>,
        comparator: Comparator<T>,
        config: NotifyConfig,
    ) -> Self {
        let id = ObservableId::next();
        let snapshot = collect_values(&elements);
        Self {
            id,
            elements: RefCell::new(elements),
            snapshot: RefCell::new(snapshot),
            comparator,
            observers: Observers::new(id, config),
            dependents: Observers::new(id, config),
            upstream: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObservableId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> NotifyConfig {
        self.observers.config()
    }

    /// Comparator used for per-element change detection.
    #[must_use]
    pub fn comparator(&self) -> &Comparator<T> {
        &self.comparator
    }

    /// The cached snapshot of the values.
    #[must_use]
    pub fn value(&self) -> Snapshot<T> {
        Rc::clone(&self.snapshot.borrow())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element box at `index`.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<Rc<Element<T>>> {
        self.elements.borrow().get(index).cloned()
    }

    /// The element boxes in order.
    #[must_use]
    pub fn elements(&self) -> Rc<[Rc<Element<T>>]> {
        self.elements.borrow().iter().cloned().collect()
    }

    pub(crate) fn elements_mut(&self) -> RefMut<'_, Vec<Rc<Element<T>>>> {
        self.elements.borrow_mut()
    }

    pub(crate) fn set_elements(&self, elements: Vec<Rc<Element<T>>>) {
        *self.elements.borrow_mut() = elements;
    }

    /// Fail if an edit now would nest fan-outs past the configured depth.
    pub(crate) fn check_depth(&self) -> CellResult<()> {
        self.dependents.check_depth()?;
        self.observers.check_depth()
    }

    /// Rebuild the snapshot and fan out: dependents first, then value
    /// observers.
    pub(crate) fn notify_changes(&self, changed: ElementSet) {
        let elements = self.elements();
        let snapshot = collect_values(&elements);
        *self.snapshot.borrow_mut() = Rc::clone(&snapshot);
        trace!(
            array = %self.id,
            len = elements.len(),
            changed = changed.len(),
            "array changed"
        );

        let change = ArrayChange {
            elements,
            changed: Rc::new(changed),
        };
        self.dependents.notify(&change);
        self.observers.notify(&snapshot);
    }

    pub(crate) fn add_observer(&self, observer: Rc<dyn Observer<Snapshot<T>>>) -> SubscriberKey {
        self.observers.insert(observer)
    }

    pub(crate) fn add_weak_observer(
        &self,
        observer: Weak<dyn Observer<Snapshot<T>>>,
    ) -> SubscriberKey {
        self.observers.insert_weak(observer)
    }

    pub(crate) fn add_dependent(
        &self,
        dependent: Weak<dyn Observer<ArrayChange<T>>>,
    ) -> SubscriberKey {
        self.dependents.insert_weak(dependent)
    }

    /// Number of live value subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Number of live derived arrays built on this one.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    pub(crate) fn attach(&self, subscription: Subscription) {
        self.upstream.borrow_mut().push(subscription);
    }

    pub(crate) fn release_upstream(&self) -> usize {
        let released = std::mem::take(&mut *self.upstream.borrow_mut());
        released.len()
    }

    pub(crate) fn upstream_count(&self) -> usize {
        self.upstream.borrow().len()
    }
}

impl<T: 'static> Detach for ArrayCore<T> {
    fn detach_subscriber(&self, key: SubscriberKey) {
        // Keys are unique across registries; at most one of these hits.
        if !self.observers.remove(key) {
            self.dependents.remove(key);
        }
    }
}

fn collect_values<T: Clone>(elements: &[Rc<Element<T>>]) -> Snapshot<T> {
    elements.iter().map(|element| element.get()).collect()
}

/// Iterator over a snapshot taken when the iterator was created.
#[derive(Debug, Clone)]
pub struct SnapshotIter<T> {
    snapshot: Snapshot<T>,
    front: usize,
    back: usize,
}

impl<T> SnapshotIter<T> {
    fn new(snapshot: Snapshot<T>) -> Self {
        let back = snapshot.len();
        Self {
            snapshot,
            front: 0,
            back,
        }
    }
}

impl<T: Clone> Iterator for SnapshotIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.front >= self.back {
            return None;
        }
        let item = self.snapshot.get(self.front).cloned();
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T: Clone> DoubleEndedIterator for SnapshotIter<T> {
    fn next_back(&mut self) -> Option<T> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.snapshot.get(self.back).cloned()
    }
}

impl<T: Clone> ExactSizeIterator for SnapshotIter<T> {}

/// Read-only surface shared by every array type.
///
/// Arrays are also a [`Source`] of their [`Snapshot`], so they can feed
/// [`derive`](cellflow_core::derive) and [`join`](cellflow_core::join) like
/// any other observable.
pub trait ObservableArray<T: Clone + 'static>: Source<Snapshot<T>> {
    /// Storage behind this array.
    #[doc(hidden)]
    fn core(&self) -> &ArrayCore<T>;

    /// Handle a subscription keeps alive and detaches from.
    #[doc(hidden)]
    fn keep_alive(&self) -> Rc<dyn Detach>;

    /// Current values.
    fn value(&self) -> Snapshot<T> {
        self.core().value()
    }

    /// Number of elements.
    fn len(&self) -> usize {
        self.core().len()
    }

    /// Whether the array has no elements.
    fn is_empty(&self) -> bool {
        self.core().is_empty()
    }

    /// Value at `index`, or `None` past the end.
    fn get(&self, index: usize) -> Option<T> {
        self.core().value().get(index).cloned()
    }

    /// Identity of the element at `index`.
    fn element_id(&self, index: usize) -> Option<ElementId> {
        self.core().element(index).map(|element| element.id())
    }

    /// Iterate over the values as they are right now. Later edits do not
    /// affect an iterator already created.
    fn iter(&self) -> SnapshotIter<T> {
        SnapshotIter::new(self.core().value())
    }

    /// Number of live value subscribers.
    fn subscriber_count(&self) -> usize {
        self.core().subscriber_count()
    }

    /// Subscribe a closure to value changes.
    fn subscribe(&self, observer: impl Fn(&Snapshot<T>, ObservableId) + 'static) -> Subscription
    where
        Self: Sized,
    {
        let key = self.core().add_observer(Rc::new(observer));
        Subscription::new(self.keep_alive(), key)
    }

    /// Subscribe an object observer by weak reference.
    fn subscribe_observer<O>(&self, observer: &Rc<O>) -> Subscription
    where
        Self: Sized,
        O: Observer<Snapshot<T>> + 'static,
    {
        let observer: Rc<dyn Observer<Snapshot<T>>> = observer.clone();
        let key = self.core().add_weak_observer(Rc::downgrade(&observer));
        Subscription::new(self.keep_alive(), key)
    }

    /// Derive an array by applying `mapper` to every element. Results are
    /// compared with `PartialEq`.
    fn map<R, F>(&self, mapper: F) -> MappedArray<T, R>
    where
        Self: Sized,
        R: Clone + PartialEq + 'static,
        F: Fn(&T) -> R + 'static,
    {
        self.map_with(mapper, Comparator::equal())
    }

    /// Derive an array with a custom comparator for the mapped values.
    fn map_with<R, F>(&self, mapper: F, comparator: Comparator<R>) -> MappedArray<T, R>
    where
        Self: Sized,
        R: Clone + 'static,
        F: Fn(&T) -> R + 'static,
    {
        MappedArray::new(self, Rc::new(mapper), comparator)
    }

    /// Derive an array whose mapper is itself observable. Replacing the
    /// mapper recomputes every element.
    fn map_observed<R>(
        &self,
        mapper: &impl Source<Mapper<T, R>>,
        comparator: Comparator<R>,
    ) -> MappedArray<T, R>
    where
        Self: Sized,
        R: Clone + 'static,
    {
        MappedArray::with_mapper_source(self, mapper, comparator)
    }
}

/// Delegate `Source<Snapshot<T>>` to the array's storage.
pub(crate) fn subscribe_snapshot<T: Clone + 'static>(
    array: &impl ObservableArray<T>,
    observer: Rc<dyn Observer<Snapshot<T>>>,
) -> Subscription {
    let key = array.core().add_observer(observer);
    Subscription::new(array.keep_alive(), key)
}

pub(crate) fn subscribe_snapshot_weak<T: Clone + 'static>(
    array: &impl ObservableArray<T>,
    observer: Weak<dyn Observer<Snapshot<T>>>,
) -> Subscription {
    let key = array.core().add_weak_observer(observer);
    Subscription::new(array.keep_alive(), key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn core(values: &[i32]) -> ArrayCore<i32> {
        ArrayCore::new(
            values.iter().copied(),
            Comparator::equal(),
            NotifyConfig::default(),
        )
    }

    #[test]
    fn snapshot_reflects_initial_values() {
        let core = core(&[1, 2, 3]);
        assert_eq!(&*core.value(), &[1, 2, 3]);
        assert_eq!(core.len(), 3);
        assert!(core.element(3).is_none());
    }

    #[test]
    fn notify_changes_rebuilds_snapshot() {
        let core = core(&[1, 2]);
        let stale = core.value();
        core.elements_mut().push(Element::new(3));
        assert_eq!(&*core.value(), &[1, 2], "snapshot is rebuilt on notify");
        core.notify_changes(ElementSet::default());
        assert_eq!(&*core.value(), &[1, 2, 3]);
        assert_eq!(&*stale, &[1, 2]);
    }

    struct Recorder {
        changes: RefCell<Vec<(usize, usize)>>,
    }

    impl Observer<ArrayChange<i32>> for Recorder {
        fn observe(&self, change: &ArrayChange<i32>, _source: ObservableId) {
            self.changes
                .borrow_mut()
                .push((change.elements.len(), change.changed.len()));
        }
    }

    #[test]
    fn dependents_run_before_observers() {
        let core = Rc::new(core(&[1]));
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&order);
        core.add_observer(Rc::new(move |_: &Snapshot<i32>, _: ObservableId| {
            log.borrow_mut().push("observer");
        }));

        let recorder = Rc::new(Recorder {
            changes: RefCell::new(Vec::new()),
        });
        let log = Rc::clone(&order);
        let dependent = Rc::new(move |_: &ArrayChange<i32>, _: ObservableId| {
            log.borrow_mut().push("dependent");
        });
        let dependent: Rc<dyn Observer<ArrayChange<i32>>> = dependent;
        core.add_dependent(Rc::downgrade(&dependent));
        let as_dyn: Rc<dyn Observer<ArrayChange<i32>>> = recorder.clone();
        core.add_dependent(Rc::downgrade(&as_dyn));

        let first = core.element(0).map(|element| element.id());
        let mut changed = ElementSet::default();
        changed.extend(first);
        core.notify_changes(changed);

        assert_eq!(*order.borrow(), vec!["dependent", "observer"]);
        assert_eq!(*recorder.changes.borrow(), vec![(1, 1)]);
    }

    #[test]
    fn dead_dependents_are_pruned() {
        let core = core(&[]);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let dependent: Rc<dyn Observer<ArrayChange<i32>>> =
            Rc::new(move |_: &ArrayChange<i32>, _: ObservableId| counter.set(counter.get() + 1));
        core.add_dependent(Rc::downgrade(&dependent));
        assert_eq!(core.dependent_count(), 1);

        drop(dependent);
        assert_eq!(core.dependent_count(), 0);
        core.notify_changes(ElementSet::default());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn detach_removes_from_either_registry() {
        let core = Rc::new(core(&[]));
        let key = core.add_observer(Rc::new(|_: &Snapshot<i32>, _: ObservableId| {}));
        assert_eq!(core.subscriber_count(), 1);
        core.detach_subscriber(key);
        assert_eq!(core.subscriber_count(), 0);
    }

    #[test]
    fn snapshot_iter_is_double_ended() {
        let iter = SnapshotIter::new(Rc::from(vec![1, 2, 3]));
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.clone().rev().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(iter.collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
