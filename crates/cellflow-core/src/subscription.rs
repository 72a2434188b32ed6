#![forbid(unsafe_code)]

//! RAII subscription guards.

use std::fmt;
use std::rc::Rc;

use crate::id::SubscriberKey;

/// Type-erased "remove this subscriber" capability of an observable.
///
/// Implemented by the shared interior of every observable so a
/// [`Subscription`] can outlive the handle it was created from.
pub trait Detach {
    /// Remove the registry entry for `key`, if it is still present.
    fn detach_subscriber(&self, key: SubscriberKey);
}

/// Guard returned by every `subscribe` call.
///
/// While it exists, the subscription holds a strong handle on the observable
/// it was taken on, so an observable watched by a live subscription cannot
/// be freed. Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the observer before the next notification and releases that
/// handle.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: SubscriberKey,
    owner: Option<Rc<dyn Detach>>,
}

impl Subscription {
    /// Wrap a registry entry of `owner`.
    pub fn new(owner: Rc<dyn Detach>, key: SubscriberKey) -> Self {
        Self {
            key,
            owner: Some(owner),
        }
    }

    /// Registry key of this subscription.
    #[must_use]
    pub fn key(&self) -> SubscriberKey {
        self.key
    }

    /// Remove the observer now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Give up the guard without unsubscribing.
    ///
    /// The observer stays registered for as long as the observable lives,
    /// and the observable is no longer kept alive by this subscription.
    pub fn forget(mut self) {
        self.owner = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.detach_subscriber(self.key);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.owner.is_some())
            .finish()
    }
}
