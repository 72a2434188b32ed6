#![forbid(unsafe_code)]

//! Identity-bearing element boxes.
//!
//! Arrays store their values in [`Element`] boxes rather than directly.
//! A box keeps its [`ElementId`] for as long as it lives, whatever happens
//! to its value, and derived arrays diff their source by box identity.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of one element box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}

/// A value box with a stable identity.
pub struct Element<T> {
    id: ElementId,
    value: RefCell<T>,
}

impl<T> Element<T> {
    pub(crate) fn new(value: T) -> Rc<Self> {
        Rc::new(Self {
            id: ElementId::next(),
            value: RefCell::new(value),
        })
    }

    /// Identity of this box.
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Access the value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Store a new value, returning the old one. The identity is kept.
    pub(crate) fn replace(&self, value: T) -> T {
        self.value.replace(value)
    }
}

impl<T: Clone> Element<T> {
    /// Clone of the value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Element<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("value", &*self.value.borrow())
            .finish()
    }
}
