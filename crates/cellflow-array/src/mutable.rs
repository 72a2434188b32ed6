#![forbid(unsafe_code)]

//! The writable array.
//!
//! Every edit validates its arguments before touching anything, treats empty
//! input as a no-op, and ends with exactly one change notification carrying
//! the ids of the elements whose value changed. Pure reshuffles (insert,
//! delete, move) flag nothing: the elements that moved are the same boxes as
//! before.

use std::fmt;
use std::rc::{Rc, Weak};

use cellflow_core::{Comparator, Detach, NotifyConfig, ObservableId, Observer, Source, Subscription};
use tracing::debug;

use crate::element::Element;
use crate::error::{ArrayError, Result};
use crate::store::{
    ArrayCore, ElementSet, ObservableArray, Snapshot, subscribe_snapshot, subscribe_snapshot_weak,
};

/// An observable array that can be edited in place.
///
/// Cloning a `MutableArray` creates a new handle to the **same** array.
///
/// # Example
///
/// ```
/// use cellflow_array::{MutableArray, ObservableArray};
///
/// let numbers = MutableArray::new(vec![4, 6, 56]);
/// let doubled = numbers.map(|v| v * 2);
///
/// numbers.set_at(1, 3).unwrap();
/// numbers.push(1).unwrap();
/// assert_eq!(&*doubled.value(), &[8, 6, 112, 2]);
/// ```
pub struct MutableArray<T> {
    core: Rc<ArrayCore<T>>,
}

impl<T> Clone for MutableArray<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableArray").field(&self.core).finish()
    }
}

impl<T: Clone + PartialEq + 'static> MutableArray<T> {
    /// Create an array whose elements are compared with `PartialEq`.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self::with_comparator(values, Comparator::equal())
    }
}

impl<T: Clone + PartialEq + 'static> Default for MutableArray<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Clone + 'static> MutableArray<T> {
    /// Create an array with a custom element comparator.
    #[must_use]
    pub fn with_comparator(values: impl IntoIterator<Item = T>, comparator: Comparator<T>) -> Self {
        Self::with_config(values, comparator, NotifyConfig::default())
    }

    /// Create an array with a custom comparator and notification config.
    #[must_use]
    pub fn with_config(
        values: impl IntoIterator<Item = T>,
        comparator: Comparator<T>,
        config: NotifyConfig,
    ) -> Self {
        Self {
            core: Rc::new(ArrayCore::new(values, comparator, config)),
        }
    }

    /// Overwrite values starting at `target`, appending past the end.
    ///
    /// Elements in range keep their identity and are only flagged as changed
    /// if the comparator reports a difference. Non-empty input always
    /// notifies; empty input is accepted at any `target`.
    pub fn set(&self, target: usize, values: impl IntoIterator<Item = T>) -> Result<()> {
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return Ok(());
        }
        self.core.check_depth()?;
        let len = self.core.len();
        if target > len {
            return Err(ArrayError::SetOutOfBounds { target, len });
        }

        let existing: Vec<_> = self
            .core
            .elements()
            .iter()
            .skip(target)
            .take(values.len())
            .cloned()
            .collect();

        let mut changed = ElementSet::default();
        let mut appended = Vec::new();
        for (offset, value) in values.into_iter().enumerate() {
            match existing.get(offset) {
                Some(element) => {
                    let same =
                        element.with(|current| self.core.comparator().equivalent(&value, current));
                    if !same {
                        element.replace(value);
                        changed.insert(element.id());
                    }
                }
                None => appended.push(Element::new(value)),
            }
        }
        self.core.elements_mut().extend(appended);
        self.core.notify_changes(changed);
        Ok(())
    }

    /// Overwrite (or append, at `index == len`) a single value.
    pub fn set_at(&self, index: usize, value: T) -> Result<()> {
        self.set(index, [value])
    }

    /// Insert fresh elements before `target`. Existing elements only shift.
    pub fn insert(&self, target: usize, values: impl IntoIterator<Item = T>) -> Result<()> {
        let fresh: Vec<_> = values.into_iter().map(Element::new).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        self.core.check_depth()?;
        let len = self.core.len();
        if target > len {
            return Err(ArrayError::InsertOutOfBounds { target, len });
        }
        self.core.elements_mut().splice(target..target, fresh);
        self.core.notify_changes(ElementSet::default());
        Ok(())
    }

    /// Append one value.
    pub fn push(&self, value: T) -> Result<()> {
        self.insert(self.core.len(), [value])
    }

    /// Remove `length` elements starting at `start`.
    ///
    /// The range is clipped to the array: a negative `start` eats into
    /// `length`, and anything past the end is ignored. Never fails; an empty
    /// clipped range is a no-op.
    ///
    /// # Failure Modes
    ///
    /// - **Re-entrancy limit**: a delete issued deeper than
    ///   [`NotifyConfig::max_depth`] is dropped. The array is left untouched
    ///   and a `debug!` event names the skipped range.
    pub fn delete(&self, start: isize, length: usize) {
        let len = self.core.len();
        let end = start.saturating_add_unsigned(length);
        let first = usize::try_from(start.max(0)).unwrap_or(0).min(len);
        let last = usize::try_from(end.max(0)).unwrap_or(0).min(len);
        if first >= last {
            return;
        }
        if let Err(err) = self.core.check_depth() {
            debug!(array = %self.core.id(), first, last, %err, "delete skipped");
            return;
        }
        self.core.elements_mut().drain(first..last);
        self.core.notify_changes(ElementSet::default());
    }

    /// Move `length` elements starting at `source` so they end up before
    /// the element currently at `target` (or at the end for `target == len`).
    ///
    /// Identities are preserved; only the order changes.
    pub fn move_within(&self, source: usize, target: usize, length: usize) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        self.core.check_depth()?;
        let len = self.core.len();
        let end = source.saturating_add(length);
        if source >= len || end > len {
            return Err(ArrayError::MoveSourceOutOfBounds {
                start: source,
                length,
                len,
            });
        }
        if target > len {
            return Err(ArrayError::MoveTargetOutOfBounds { target, len });
        }
        if (source..=end).contains(&target) {
            return Err(ArrayError::MoveTargetInsideRange {
                start: source,
                target,
                end,
            });
        }

        {
            let mut elements = self.core.elements_mut();
            let moved: Vec<_> = elements.drain(source..end).collect();
            let at = if target > source { target - length } else { target };
            elements.splice(at..at, moved);
        }
        self.core.notify_changes(ElementSet::default());
        Ok(())
    }

    /// Move `length` elements starting at `source` to the end.
    pub fn move_to_end(&self, source: usize, length: usize) -> Result<()> {
        self.move_within(source, self.core.len(), length)
    }

    /// Replace the whole array. Every element is recreated, so arrays
    /// mapped from this one recompute from scratch.
    pub fn replace(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.core.check_depth()?;
        let fresh = values.into_iter().map(Element::new).collect();
        self.core.set_elements(fresh);
        self.core.notify_changes(ElementSet::default());
        Ok(())
    }
}

impl<T: Clone + 'static> ObservableArray<T> for MutableArray<T> {
    fn core(&self) -> &ArrayCore<T> {
        &self.core
    }

    fn keep_alive(&self) -> Rc<dyn Detach> {
        self.core.clone()
    }
}

impl<T: Clone + 'static> Source<Snapshot<T>> for MutableArray<T> {
    fn id(&self) -> ObservableId {
        self.core.id()
    }

    fn current(&self) -> Snapshot<T> {
        self.core.value()
    }

    fn config(&self) -> NotifyConfig {
        self.core.config()
    }

    fn subscribe_dyn(&self, observer: Rc<dyn Observer<Snapshot<T>>>) -> Subscription {
        subscribe_snapshot(self, observer)
    }

    fn subscribe_weak_dyn(&self, observer: Weak<dyn Observer<Snapshot<T>>>) -> Subscription {
        subscribe_snapshot_weak(self, observer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cellflow_core::CellError;
    use std::cell::RefCell;

    fn recorder<T: Clone + 'static>(
        array: &MutableArray<T>,
    ) -> (Rc<RefCell<Vec<Vec<T>>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = array.subscribe(move |v: &Snapshot<T>, _| sink.borrow_mut().push(v.to_vec()));
        (seen, sub)
    }

    fn values<T: Clone + 'static>(array: &MutableArray<T>) -> Vec<T> {
        array.iter().collect()
    }

    #[test]
    fn edit_sequence() {
        let arr = MutableArray::new(vec![4, 6, 56, 23, 89, 83]);
        let (seen, _sub) = recorder(&arr);

        arr.set_at(2, 19).unwrap();
        arr.set_at(5, 3).unwrap();
        assert_eq!(values(&arr), vec![4, 6, 19, 23, 89, 3]);
        assert_eq!(seen.borrow().len(), 2);
        seen.borrow_mut().clear();

        arr.delete(1, 1);
        assert_eq!(values(&arr), vec![4, 19, 23, 89, 3]);
        arr.delete(2, 0);
        assert_eq!(seen.borrow().len(), 1, "empty delete is silent");
        arr.delete(2, 7);
        assert_eq!(values(&arr), vec![4, 19]);
        seen.borrow_mut().clear();

        arr.set_at(2, 56).unwrap();
        arr.set_at(3, 23).unwrap();
        arr.set_at(4, 6).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![vec![4, 19, 56], vec![4, 19, 56, 23], vec![4, 19, 56, 23, 6]]
        );
        seen.borrow_mut().clear();

        arr.delete(-5, 7);
        assert_eq!(values(&arr), vec![56, 23, 6]);

        arr.set_at(1, 67).unwrap();
        arr.insert(1, [68, 72]).unwrap();
        assert_eq!(values(&arr), vec![56, 68, 72, 67, 6]);

        arr.set(3, [1, 4, 6, 7]).unwrap();
        assert_eq!(values(&arr), vec![56, 68, 72, 1, 4, 6, 7]);

        arr.move_within(3, 1, 3).unwrap();
        assert_eq!(values(&arr), vec![56, 1, 4, 6, 68, 72, 7]);

        arr.move_within(0, 2, 1).unwrap();
        assert_eq!(values(&arr), vec![1, 56, 4, 6, 68, 72, 7]);

        arr.replace([1, 2, 3]).unwrap();
        assert_eq!(values(&arr), vec![1, 2, 3]);
        assert_eq!(seen.borrow().len(), 7);
        assert_eq!(seen.borrow().last(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn set_keeps_identity_and_flags_only_real_changes() {
        let arr = MutableArray::new(vec![1, 2, 3]);
        let before: Vec<_> = (0..3).map(|i| arr.element_id(i)).collect();
        let (seen, _sub) = recorder(&arr);

        arr.set(0, [1, 2, 3]).unwrap();
        let after: Vec<_> = (0..3).map(|i| arr.element_id(i)).collect();
        assert_eq!(before, after);
        assert_eq!(seen.borrow().len(), 1, "non-empty set always notifies");
    }

    #[test]
    fn set_rejects_gap() {
        let arr = MutableArray::new(vec![1]);
        assert_eq!(
            arr.set(2, [5]),
            Err(ArrayError::SetOutOfBounds { target: 2, len: 1 })
        );
        assert_eq!(values(&arr), vec![1]);
    }

    #[test]
    fn insert_bounds() {
        let arr = MutableArray::new(vec![1, 2]);
        assert_eq!(
            arr.insert(3, [9]),
            Err(ArrayError::InsertOutOfBounds { target: 3, len: 2 })
        );
        arr.insert(2, [3]).unwrap();
        arr.insert(0, [0]).unwrap();
        assert_eq!(values(&arr), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_edits_are_silent() {
        let arr = MutableArray::new(vec![1, 2]);
        let (seen, _sub) = recorder(&arr);
        arr.set(1, Vec::new()).unwrap();
        arr.insert(0, Vec::new()).unwrap();
        arr.delete(0, 0);
        arr.delete(5, 3);
        arr.delete(-10, 3);
        arr.move_within(0, 2, 0).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn empty_input_ignores_target() {
        let arr = MutableArray::new(vec![1]);
        let (seen, _sub) = recorder(&arr);
        arr.set(5, Vec::new()).unwrap();
        arr.insert(9, Vec::new()).unwrap();
        assert_eq!(values(&arr), vec![1]);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn delete_clamps() {
        let arr = MutableArray::new(vec![1, 2, 3, 4]);
        arr.delete(-1, 2);
        assert_eq!(values(&arr), vec![2, 3, 4]);
        arr.delete(2, usize::MAX);
        assert_eq!(values(&arr), vec![2, 3]);
        arr.delete(isize::MIN, usize::MAX);
        assert!(arr.is_empty());
    }

    #[test]
    fn move_errors() {
        let arr = MutableArray::new(vec![1, 2, 3, 4]);
        assert!(matches!(
            arr.move_within(4, 0, 1),
            Err(ArrayError::MoveSourceOutOfBounds { .. })
        ));
        assert!(matches!(
            arr.move_within(2, 0, 3),
            Err(ArrayError::MoveSourceOutOfBounds { .. })
        ));
        assert!(matches!(
            arr.move_within(0, 5, 1),
            Err(ArrayError::MoveTargetOutOfBounds { target: 5, len: 4 })
        ));
        assert_eq!(
            arr.move_within(1, 3, 2),
            Err(ArrayError::MoveTargetInsideRange {
                start: 1,
                target: 3,
                end: 3
            })
        );
        assert_eq!(values(&arr), vec![1, 2, 3, 4]);
    }

    #[test]
    fn move_preserves_identity() {
        let arr = MutableArray::new(vec!['a', 'b', 'c', 'd']);
        let ids: Vec<_> = (0..4).filter_map(|i| arr.element_id(i)).collect();
        arr.move_to_end(0, 2).unwrap();
        assert_eq!(values(&arr), vec!['c', 'd', 'a', 'b']);
        let moved: Vec<_> = (0..4).filter_map(|i| arr.element_id(i)).collect();
        assert_eq!(moved, vec![ids[2], ids[3], ids[0], ids[1]]);
    }

    #[test]
    fn replace_recreates_every_element() {
        let arr = MutableArray::new(vec![1, 2]);
        let before = arr.element_id(0);
        arr.replace([1, 2]).unwrap();
        assert_ne!(arr.element_id(0), before);
    }

    #[test]
    fn get_and_iter_are_bounds_safe() {
        let arr = MutableArray::new(vec![10, 20]);
        assert_eq!(arr.get(1), Some(20));
        assert_eq!(arr.get(2), None);
        let iter = arr.iter();
        arr.push(30).unwrap();
        assert_eq!(iter.collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn reentrant_edits_are_bounded() {
        let arr = MutableArray::with_config(
            Vec::<u32>::new(),
            Comparator::equal(),
            NotifyConfig::default().with_max_depth(3),
        );
        let writer = arr.clone();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let _sub = arr.subscribe(move |v: &Snapshot<u32>, _| {
            if let Err(err) = writer.push(v.len() as u32) {
                sink.borrow_mut().push(err);
            }
        });

        arr.push(0).unwrap();
        assert_eq!(values(&arr), vec![0, 1, 2]);
        assert!(matches!(
            errors.borrow().as_slice(),
            [ArrayError::Cell(CellError::ReentrancyLimit { depth: 3, limit: 3, .. })]
        ));
    }

    #[test]
    fn reentrant_delete_past_limit_is_dropped() {
        let arr = MutableArray::with_config(
            vec![1, 2, 3, 4, 5],
            Comparator::equal(),
            NotifyConfig::default().with_max_depth(2),
        );
        let writer = arr.clone();
        let (seen, _rec) = recorder(&arr);
        let _sub = arr.subscribe(move |_: &Snapshot<i32>, _| writer.delete(0, 1));

        arr.delete(0, 1);
        assert_eq!(values(&arr), vec![3, 4, 5]);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn array_is_a_source() {
        let arr = MutableArray::new(vec![1, 2, 3]);
        let total = cellflow_core::derive(&arr, |values: &Snapshot<i32>, _| {
            values.iter().sum::<i32>()
        });
        assert_eq!(total.get(), 6);
        arr.push(4).unwrap();
        assert_eq!(total.get(), 10);
    }
}
