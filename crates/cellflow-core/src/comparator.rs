#![forbid(unsafe_code)]

//! Equivalence predicates used to suppress redundant notifications.

use std::fmt;
use std::rc::Rc;

/// Decides whether a new value is equivalent to the current one.
///
/// When the comparator returns `true` the write is dropped and nobody is
/// notified. Cloning a `Comparator` shares the same predicate.
pub struct Comparator<T: ?Sized> {
    eq: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: ?Sized> Clone for Comparator<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Rc::clone(&self.eq),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Comparator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator").finish_non_exhaustive()
    }
}

impl<T: ?Sized + 'static> Comparator<T> {
    /// Build a comparator from an arbitrary equivalence predicate.
    pub fn new(eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self { eq: Rc::new(eq) }
    }

    /// A comparator that never considers two values equal, so every write
    /// notifies.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Compare `new` against `current`.
    #[inline]
    #[must_use]
    pub fn equivalent(&self, new: &T, current: &T) -> bool {
        (self.eq)(new, current)
    }
}

impl<T: PartialEq + ?Sized + 'static> Comparator<T> {
    /// `PartialEq` equality.
    #[must_use]
    pub fn equal() -> Self {
        Self::new(|a, b| a == b)
    }
}

impl<T: PartialEq + ?Sized + 'static> Default for Comparator<T> {
    fn default() -> Self {
        Self::equal()
    }
}
