#![forbid(unsafe_code)]

//! Read-and-subscribe surface shared by every observable.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::NotifyConfig;
use crate::id::ObservableId;
use crate::observer::Observer;
use crate::subscription::Subscription;

/// Object-safe view of anything that holds a value and notifies on change.
///
/// Implemented by [`Observable`](crate::Observable),
/// [`Derived`](crate::Derived), and the array types (with
/// `T = Snapshot<_>`). Derivations such as [`derive`](crate::derive) accept
/// any `Source`.
pub trait Source<T> {
    /// Identity of the observable.
    fn id(&self) -> ObservableId;

    /// Clone of the current value.
    fn current(&self) -> T;

    /// Notification configuration, inherited by values derived from this one.
    fn config(&self) -> NotifyConfig;

    /// Register an observer the source keeps alive until the returned
    /// subscription is dropped.
    fn subscribe_dyn(&self, observer: Rc<dyn Observer<T>>) -> Subscription;

    /// Register an observer the source only references weakly.
    fn subscribe_weak_dyn(&self, observer: Weak<dyn Observer<T>>) -> Subscription;
}

/// Either a plain value or an observable producing one.
pub enum MaybeObservable<T> {
    /// A constant.
    Value(T),
    /// A reactive input.
    Observed(Rc<dyn Source<T>>),
}

impl<T: Clone> MaybeObservable<T> {
    /// Wrap any source.
    pub fn observed(source: impl Source<T> + 'static) -> Self {
        Self::Observed(Rc::new(source))
    }

    /// The constant, or the source's current value.
    #[must_use]
    pub fn get(&self) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Observed(source) => source.current(),
        }
    }

    /// Whether this input can change.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        matches!(self, Self::Observed(_))
    }

    /// Configuration of the underlying source, if reactive.
    #[must_use]
    pub fn config(&self) -> Option<NotifyConfig> {
        match self {
            Self::Value(_) => None,
            Self::Observed(source) => Some(source.config()),
        }
    }
}

impl<T> Clone for MaybeObservable<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Observed(source) => Self::Observed(Rc::clone(source)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MaybeObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Observed(source) => f.debug_tuple("Observed").field(&source.id()).finish(),
        }
    }
}
