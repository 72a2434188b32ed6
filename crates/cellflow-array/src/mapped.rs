#![forbid(unsafe_code)]

//! Incrementally mapped arrays.
//!
//! # Design
//!
//! A [`MappedArray<S, R>`] keeps one output element per source element and
//! a binding table from source [`ElementId`] to output element. When the
//! source changes it receives the new source order plus the set of source
//! elements whose value changed, and:
//!
//! 1. reuses the bound output element for every source element it already
//!    knows, re-running the mapper only for flagged ones;
//! 2. creates and binds output elements for new source elements;
//! 3. drops bindings of source elements that disappeared;
//! 4. stays silent if neither the order nor any output value changed.
//!
//! Output element identity therefore survives inserts, deletes and moves in
//! the source, and arrays mapped from this one can in turn recompute
//! incrementally.
//!
//! The mapped array registers with its source as a weak dependent and holds
//! a subscription that keeps the source alive. Dropping every handle on the
//! mapped array unregisters it; [`MappedArray::destroy`] does so eagerly.
//!
//! # Failure Modes
//!
//! - **Mapper panics**: every mapper call of a pass runs before any output
//!   is written, so a panic abandons the whole pass. Outputs, bindings and
//!   the mapper stay as they were and no notification is sent.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use cellflow_core::{
    Comparator, Detach, NotifyConfig, ObservableId, Observer, Source, SubscriberKey, Subscription,
};
use tracing::debug;

use crate::element::{Element, ElementId};
use crate::store::{
    ArrayChange, ArrayCore, ElementSet, ObservableArray, Snapshot, subscribe_snapshot,
    subscribe_snapshot_weak,
};

/// A shareable mapping function, the value type of a reactive mapper.
pub type Mapper<S, R> = Rc<dyn Fn(&S) -> R>;

/// Wrap a closure as a [`Mapper`].
pub fn mapper<S, R>(f: impl Fn(&S) -> R + 'static) -> Mapper<S, R> {
    Rc::new(f)
}

struct MappedInner<S, R> {
    core: ArrayCore<R>,
    mapper: RefCell<Mapper<S, R>>,
    /// Source element id -> output element.
    bindings: RefCell<AHashMap<ElementId, Rc<Element<R>>>>,
    /// Source elements, parallel to the output order.
    sources: RefCell<Vec<Rc<Element<S>>>>,
}

impl<S: 'static, R: Clone + 'static> MappedInner<S, R> {
    fn current_mapper(&self) -> Mapper<S, R> {
        Rc::clone(&self.mapper.borrow())
    }

    /// Re-run the mapper on `source`. Returns the new value if the
    /// comparator reports a change against `output`; writes nothing.
    fn recompute(
        &self,
        mapper: &Mapper<S, R>,
        source: &Element<S>,
        output: &Element<R>,
    ) -> Option<R> {
        let value = source.with(|value| mapper(value));
        let same = output.with(|current| self.core.comparator().equivalent(&value, current));
        (!same).then_some(value)
    }

    fn commit(updates: Vec<(Rc<Element<R>>, R)>) -> ElementSet {
        let mut changed = ElementSet::default();
        for (output, value) in updates {
            output.replace(value);
            changed.insert(output.id());
        }
        changed
    }

    fn on_source_change(&self, change: &ArrayChange<S>) {
        let mapper = self.current_mapper();
        let len = change.elements.len();
        let mut outputs = Vec::with_capacity(len);
        let mut bindings = AHashMap::with_capacity(len);
        let mut updates = Vec::new();
        let mut created = 0usize;

        for source in change.elements.iter() {
            let bound = self.bindings.borrow().get(&source.id()).cloned();
            let output = match bound {
                Some(output) => {
                    if change.is_changed(source.id())
                        && let Some(value) = self.recompute(&mapper, source, &output)
                    {
                        updates.push((Rc::clone(&output), value));
                    }
                    output
                }
                None => {
                    created += 1;
                    Element::new(source.with(|value| mapper(value)))
                }
            };
            bindings.insert(source.id(), Rc::clone(&output));
            outputs.push(output);
        }

        let changed = Self::commit(updates);
        let reused = len - created;
        let dropped = self.bindings.borrow().len() - reused;
        let reordered = {
            let previous = self.core.elements();
            previous.len() != outputs.len()
                || previous
                    .iter()
                    .zip(&outputs)
                    .any(|(old, new)| !Rc::ptr_eq(old, new))
        };
        debug!(
            array = %self.core.id(),
            reused,
            created,
            dropped,
            changed = changed.len(),
            reordered,
            "mapped array recomputed"
        );

        *self.bindings.borrow_mut() = bindings;
        *self.sources.borrow_mut() = change.elements.to_vec();
        if !reordered && changed.is_empty() {
            return;
        }
        self.core.set_elements(outputs);
        self.core.notify_changes(changed);
    }

    fn on_mapper_change(&self, mapper: &Mapper<S, R>) {
        let sources = self.sources.borrow().clone();
        let outputs = self.core.elements();
        let updates: Vec<_> = sources
            .iter()
            .zip(outputs.iter())
            .filter_map(|(source, output)| {
                self.recompute(mapper, source, output)
                    .map(|value| (Rc::clone(output), value))
            })
            .collect();

        *self.mapper.borrow_mut() = Rc::clone(mapper);
        let changed = Self::commit(updates);
        debug!(
            array = %self.core.id(),
            recomputed = sources.len(),
            changed = changed.len(),
            "mapper replaced"
        );
        if !changed.is_empty() {
            self.core.notify_changes(changed);
        }
    }
}

impl<S: 'static, R: Clone + 'static> Observer<ArrayChange<S>> for MappedInner<S, R> {
    fn observe(&self, change: &ArrayChange<S>, _source: ObservableId) {
        self.on_source_change(change);
    }
}

impl<S, R: 'static> Detach for MappedInner<S, R> {
    fn detach_subscriber(&self, key: SubscriberKey) {
        self.core.detach_subscriber(key);
    }
}

/// An array derived element-wise from another array.
///
/// # Invariants
///
/// 1. `value()[i] == mapper(source.value()[i])` (up to the comparator)
///    after every source notification.
/// 2. At most one output element exists per live source element.
/// 3. An output element keeps its identity for as long as its source
///    element stays in the source array.
pub struct MappedArray<S, R> {
    inner: Rc<MappedInner<S, R>>,
}

impl<S, R> Clone for MappedArray<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, R: fmt::Debug> fmt::Debug for MappedArray<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MappedArray").field(&self.inner.core).finish()
    }
}

impl<S: Clone + 'static, R: Clone + 'static> MappedArray<S, R> {
    pub(crate) fn new<A>(source: &A, mapper: Mapper<S, R>, comparator: Comparator<R>) -> Self
    where
        A: ObservableArray<S>,
    {
        let sources = source.core().elements().to_vec();
        let outputs: Vec<_> = sources
            .iter()
            .map(|element| Element::new(element.with(|value| mapper(value))))
            .collect();
        let bindings = sources
            .iter()
            .zip(&outputs)
            .map(|(source, output)| (source.id(), Rc::clone(output)))
            .collect();

        let inner = Rc::new(MappedInner {
            core: ArrayCore::from_elements(outputs, comparator, source.core().config()),
            mapper: RefCell::new(mapper),
            bindings: RefCell::new(bindings),
            sources: RefCell::new(sources),
        });

        let dependent: Weak<MappedInner<S, R>> = Rc::downgrade(&inner);
        let dependent: Weak<dyn Observer<ArrayChange<S>>> = dependent;
        let key = source.core().add_dependent(dependent);
        inner
            .core
            .attach(Subscription::new(source.keep_alive(), key));

        Self { inner }
    }

    pub(crate) fn with_mapper_source<A>(
        source: &A,
        mapper: &impl Source<Mapper<S, R>>,
        comparator: Comparator<R>,
    ) -> Self
    where
        A: ObservableArray<S>,
    {
        let array = Self::new(source, mapper.current(), comparator);
        let weak = Rc::downgrade(&array.inner);
        let sub = mapper.subscribe_dyn(Rc::new(move |mapper: &Mapper<S, R>, _: ObservableId| {
            if let Some(inner) = weak.upgrade() {
                inner.on_mapper_change(mapper);
            }
        }));
        array.inner.core.attach(sub);
        array
    }

    /// Unsubscribe from the source (and the mapper, if reactive) now. The
    /// values are frozen at their last result.
    pub fn destroy(&self) {
        let released = self.inner.core.release_upstream();
        debug!(array = %self.inner.core.id(), released, "mapped array destroyed");
    }

    /// Whether the array still follows its source.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.core.upstream_count() > 0
    }
}

impl<S: Clone + 'static, R: Clone + 'static> ObservableArray<R> for MappedArray<S, R> {
    fn core(&self) -> &ArrayCore<R> {
        &self.inner.core
    }

    fn keep_alive(&self) -> Rc<dyn Detach> {
        self.inner.clone()
    }
}

impl<S: Clone + 'static, R: Clone + 'static> Source<Snapshot<R>> for MappedArray<S, R> {
    fn id(&self) -> ObservableId {
        self.inner.core.id()
    }

    fn current(&self) -> Snapshot<R> {
        self.inner.core.value()
    }

    fn config(&self) -> NotifyConfig {
        self.inner.core.config()
    }

    fn subscribe_dyn(&self, observer: Rc<dyn Observer<Snapshot<R>>>) -> Subscription {
        subscribe_snapshot(self, observer)
    }

    fn subscribe_weak_dyn(&self, observer: Weak<dyn Observer<Snapshot<R>>>) -> Subscription {
        subscribe_snapshot_weak(self, observer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::MutableArray;
    use cellflow_core::Observable;
    use std::cell::Cell;

    fn ids<T: Clone + 'static>(array: &impl ObservableArray<T>) -> Vec<ElementId> {
        (0..array.len())
            .filter_map(|index| array.element_id(index))
            .collect()
    }

    fn counter<T: Clone + 'static>(array: &impl ObservableArray<T>) -> (Rc<Cell<u32>>, Subscription) {
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        let sub = subscribe_snapshot(
            array,
            Rc::new(move |_: &Snapshot<T>, _: ObservableId| sink.set(sink.get() + 1)),
        );
        (hits, sub)
    }

    #[test]
    fn maps_initial_values() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let doubled = source.map(|v| v * 2);
        assert_eq!(&*doubled.value(), &[2, 4, 6]);
    }

    #[test]
    fn value_edit_recomputes_only_that_element() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let calls = Rc::new(Cell::new(0));
        let tally = Rc::clone(&calls);
        let mapped = source.map(move |v: &i32| {
            tally.set(tally.get() + 1);
            v * 10
        });
        assert_eq!(calls.get(), 3);
        let before = ids(&mapped);

        source.set_at(1, 5).unwrap();
        assert_eq!(calls.get(), 4);
        assert_eq!(&*mapped.value(), &[10, 50, 30]);
        assert_eq!(ids(&mapped), before);
    }

    #[test]
    fn insert_and_delete_preserve_survivor_identity() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let mapped = source.map(|v| v + 100);
        let before = ids(&mapped);

        source.insert(1, [7]).unwrap();
        let after_insert = ids(&mapped);
        assert_eq!(&*mapped.value(), &[101, 107, 102, 103]);
        assert_eq!(after_insert[0], before[0]);
        assert_eq!(after_insert[2..], before[1..]);

        source.delete(0, 2);
        assert_eq!(&*mapped.value(), &[102, 103]);
        assert_eq!(ids(&mapped), before[1..]);
    }

    #[test]
    fn move_reorders_without_recomputing() {
        let source = MutableArray::new(vec![1, 2, 3, 4]);
        let calls = Rc::new(Cell::new(0));
        let tally = Rc::clone(&calls);
        let mapped = source.map(move |v: &i32| {
            tally.set(tally.get() + 1);
            *v
        });
        let before = ids(&mapped);

        source.move_within(0, 3, 1).unwrap();
        assert_eq!(&*mapped.value(), &[2, 3, 1, 4]);
        assert_eq!(calls.get(), 4);
        assert_eq!(ids(&mapped), vec![before[1], before[2], before[0], before[3]]);
    }

    #[test]
    fn unchanged_result_skips_notification() {
        let source = MutableArray::new(vec![1, 2]);
        let parity = source.map(|v| v % 2);
        let (hits, _sub) = counter(&parity);

        source.set_at(0, 3).unwrap();
        assert_eq!(hits.get(), 0);
        source.set_at(0, 4).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(&*parity.value(), &[0, 0]);
    }

    #[test]
    fn chained_maps_stay_incremental() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let first = source.map(|v| v * 2);
        let second = first.map(|v| v + 1);
        let before = ids(&second);

        source.set_at(2, 10).unwrap();
        assert_eq!(&*second.value(), &[3, 5, 21]);
        assert_eq!(ids(&second), before);
    }

    #[test]
    fn intermediate_map_kept_alive_by_downstream() {
        let source = MutableArray::new(vec![1, 2]);
        let second = {
            let first = source.map(|v| v * 2);
            first.map(|v| v + 1)
        };
        source.push(3).unwrap();
        assert_eq!(&*second.value(), &[3, 5, 7]);
    }

    #[test]
    fn dropping_mapped_array_unregisters_it() {
        let source = MutableArray::new(vec![1]);
        let mapped = source.map(|v| *v);
        assert_eq!(source.core().dependent_count(), 1);
        drop(mapped);
        assert_eq!(source.core().dependent_count(), 0);
    }

    #[test]
    fn destroy_freezes_values() {
        let source = MutableArray::new(vec![1, 2]);
        let mapped = source.map(|v| v * 3);
        assert!(mapped.is_live());
        mapped.destroy();
        assert!(!mapped.is_live());
        assert_eq!(source.core().dependent_count(), 0);

        source.set_at(0, 9).unwrap();
        assert_eq!(&*mapped.value(), &[3, 6]);
    }

    #[test]
    fn panicking_mapper_leaves_chain_consistent() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let first = source.map(|v: &i32| {
            assert_ne!(*v, 100, "mapper rejects 100");
            v * 2
        });
        let second = first.map(|v| v + 1);

        source.set(0, [5, 100]).unwrap();
        assert_eq!(&*first.value(), &[2, 4, 6], "no output written by a failed pass");

        source.set_at(2, 7).unwrap();
        assert_eq!(&*first.value(), &[2, 4, 14]);
        let expected: Vec<i32> = first.iter().map(|v| v + 1).collect();
        assert_eq!(&*second.value(), expected.as_slice());
    }

    #[test]
    fn panicking_reactive_mapper_is_not_installed() {
        let source = MutableArray::new(vec![1, 2]);
        let scale = Observable::with_comparator(mapper(|v: &i32| v * 2), Comparator::never());
        let mapped = source.map_observed(&scale, Comparator::equal());

        scale.set(mapper(|v: &i32| {
            assert_ne!(*v, 2, "mapper rejects 2");
            v * 10
        }));
        assert_eq!(&*mapped.value(), &[2, 4]);

        source.push(3).unwrap();
        assert_eq!(&*mapped.value(), &[2, 4, 6]);
    }

    #[test]
    fn destroy_releases_reactive_mapper() {
        let source = MutableArray::new(vec![1, 2]);
        let scale = Observable::with_comparator(mapper(|v: &i32| v * 2), Comparator::never());
        let mapped = source.map_observed(&scale, Comparator::equal());
        assert_eq!(scale.subscriber_count(), 1);

        mapped.destroy();
        assert_eq!(scale.subscriber_count(), 0);
        assert_eq!(source.core().dependent_count(), 0);

        scale.set(mapper(|v: &i32| v * 7));
        source.set_at(0, 9).unwrap();
        assert_eq!(&*mapped.value(), &[2, 4]);
    }

    #[test]
    fn reactive_mapper_recomputes_everything() {
        let source = MutableArray::new(vec![1, 2, 3]);
        let scale = Observable::with_comparator(
            mapper(|v: &i32| v * 2),
            Comparator::new(|a: &Mapper<i32, i32>, b: &Mapper<i32, i32>| Rc::ptr_eq(a, b)),
        );
        let mapped = source.map_observed(&scale, Comparator::equal());
        assert_eq!(&*mapped.value(), &[2, 4, 6]);
        let before = ids(&mapped);
        let (hits, _sub) = counter(&mapped);

        scale.set(mapper(|v: &i32| v * 5));
        assert_eq!(&*mapped.value(), &[5, 10, 15]);
        assert_eq!(ids(&mapped), before);
        assert_eq!(hits.get(), 1);

        // A mapper producing the same results changes nothing.
        scale.set(mapper(|v: &i32| v * 5));
        assert_eq!(hits.get(), 1);

        source.push(4).unwrap();
        assert_eq!(&*mapped.value(), &[5, 10, 15, 20]);
    }

    #[test]
    fn mapped_array_inherits_config() {
        let config = NotifyConfig::default().with_max_depth(3);
        let source = MutableArray::with_config(vec![1], Comparator::equal(), config);
        let mapped = source.map(|v| *v);
        assert_eq!(Source::config(&mapped), config);
    }
}
