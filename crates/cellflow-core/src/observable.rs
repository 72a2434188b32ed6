#![forbid(unsafe_code)]

//! The mutable value cell.
//!
//! # Design
//!
//! [`Observable<T>`] is a cheap handle over shared, reference-counted
//! storage. Cloning it creates another handle to the **same** value. A write
//! is compared against the current value with the cell's [`Comparator`];
//! equivalent writes are dropped, anything else is stored, the version is
//! bumped and every subscriber is called synchronously.
//!
//! The value is stored before any subscriber runs, so observers that read
//! the cell during notification see the new value.
//!
//! # Failure Modes
//!
//! - **Observer panics**: isolated by the registry; the write still counts.
//! - **Write from inside an observer**: allowed, producing a nested
//!   fan-out. Once the nesting exceeds [`NotifyConfig::max_depth`],
//!   [`try_set`](Observable::try_set) returns
//!   [`CellError::ReentrancyLimit`](crate::CellError::ReentrancyLimit) and [`set`](Observable::set) panics.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::comparator::Comparator;
use crate::config::NotifyConfig;
use crate::error::Result;
use crate::id::{ObservableId, SubscriberKey};
use crate::observer::{Observer, Observers};
use crate::source::Source;
use crate::subscription::{Detach, Subscription};

/// Shared interior for [`Observable<T>`].
pub(crate) struct ObservableInner<T> {
    id: ObservableId,
    value: RefCell<T>,
    comparator: Comparator<T>,
    version: Cell<u64>,
    observers: Observers<T>,
    /// Subscriptions on the sources this cell is derived from.
    upstream: RefCell<Vec<Subscription>>,
}

impl<T: 'static> Detach for ObservableInner<T> {
    fn detach_subscriber(&self, key: SubscriberKey) {
        self.observers.remove(key);
    }
}

/// A shared, version-tracked value with change notification.
///
/// # Invariants
///
/// 1. `version` increments by 1 for every write the comparator accepts.
/// 2. Subscribers run in registration order, after the value is stored.
/// 3. A write the comparator rejects changes nothing and notifies nobody.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell compared with `PartialEq`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_comparator(value, Comparator::equal())
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create a cell with a custom comparator.
    #[must_use]
    pub fn with_comparator(value: T, comparator: Comparator<T>) -> Self {
        Self::with_config(value, comparator, NotifyConfig::default())
    }

    /// Create a cell with a custom comparator and notification config.
    #[must_use]
    pub fn with_config(value: T, comparator: Comparator<T>, config: NotifyConfig) -> Self {
        let id = ObservableId::next();
        Self {
            inner: Rc::new(ObservableInner {
                id,
                value: RefCell::new(value),
                comparator,
                version: Cell::new(0),
                observers: Observers::new(id, config),
                upstream: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Write a value, notifying subscribers if the comparator reports a
    /// change. Returns whether the value changed.
    ///
    /// # Panics
    ///
    /// Panics if the write is issued from inside this cell's own fan-out
    /// beyond [`NotifyConfig::max_depth`]. Use [`try_set`](Self::try_set)
    /// to handle that case.
    pub fn set(&self, value: T) -> bool {
        match self.try_set(value) {
            Ok(changed) => changed,
            Err(err) => panic!("{err}"),
        }
    }

    /// Write a value, reporting a re-entrancy violation instead of panicking.
    pub fn try_set(&self, value: T) -> Result<bool> {
        self.inner.observers.check_depth()?;
        if self
            .inner
            .comparator
            .equivalent(&value, &self.inner.value.borrow())
        {
            return Ok(false);
        }
        *self.inner.value.borrow_mut() = value;
        self.inner.version.set(self.inner.version.get() + 1);

        // Observers get their own copy so none of them can hold the borrow.
        let snapshot = self.get();
        self.inner.observers.notify(&snapshot);
        Ok(true)
    }

    /// Modify a copy of the value in place and write it back.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    /// Identity of this cell.
    #[must_use]
    pub fn id(&self) -> ObservableId {
        self.inner.id
    }

    /// Number of accepted writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Notification configuration.
    #[must_use]
    pub fn config(&self) -> NotifyConfig {
        self.inner.observers.config()
    }

    /// Comparator used to filter writes.
    #[must_use]
    pub fn comparator(&self) -> &Comparator<T> {
        &self.inner.comparator
    }

    /// Subscribe a closure. It stays registered until the returned
    /// subscription is dropped.
    pub fn subscribe(&self, observer: impl Fn(&T, ObservableId) + 'static) -> Subscription {
        self.subscribe_dyn(Rc::new(observer))
    }

    /// Subscribe an object observer by weak reference. The entry disappears
    /// on its own once the last `Rc` to the observer is dropped.
    pub fn subscribe_observer<O: Observer<T> + 'static>(&self, observer: &Rc<O>) -> Subscription {
        let observer: Rc<dyn Observer<T>> = observer.clone();
        self.subscribe_weak_dyn(Rc::downgrade(&observer))
    }

    fn guard(&self, key: SubscriberKey) -> Subscription {
        let owner: Rc<dyn Detach> = self.inner.clone();
        Subscription::new(owner, key)
    }

    /// Keep an upstream subscription alive for as long as this cell lives.
    pub(crate) fn attach(&self, subscription: Subscription) {
        self.inner.upstream.borrow_mut().push(subscription);
    }

    /// Drop every upstream subscription, freezing the current value.
    pub(crate) fn release_upstream(&self) -> usize {
        let released = std::mem::take(&mut *self.inner.upstream.borrow_mut());
        released.len()
    }

    pub(crate) fn upstream_count(&self) -> usize {
        self.inner.upstream.borrow().len()
    }

    /// Write from inside an upstream observer. Errors are logged rather
    /// than unwound into the upstream fan-out.
    pub(crate) fn publish(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(observable = %self.inner.id, error = %err, "derived update dropped");
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ObservableInner<T>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ObservableInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<T: Clone + 'static> Source<T> for Observable<T> {
    fn id(&self) -> ObservableId {
        self.inner.id
    }

    fn current(&self) -> T {
        self.get()
    }

    fn config(&self) -> NotifyConfig {
        Observable::config(self)
    }

    fn subscribe_dyn(&self, observer: Rc<dyn Observer<T>>) -> Subscription {
        let key = self.inner.observers.insert(observer);
        self.guard(key)
    }

    fn subscribe_weak_dyn(&self, observer: Weak<dyn Observer<T>>) -> Subscription {
        let key = self.inner.observers.insert_weak(observer);
        self.guard(key)
    }
}

impl<T: Clone + Default + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
