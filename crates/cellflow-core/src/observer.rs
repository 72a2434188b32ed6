#![forbid(unsafe_code)]

//! Observer trait and the per-observable subscriber registry.
//!
//! # Design
//!
//! [`Observers<V>`] keeps an ordered list of wrapped observers. Closures are
//! stored as strong `Rc`s: the registry is their only owner, and they stay
//! registered until their [`Subscription`](crate::Subscription) is dropped.
//! Object observers are stored as `Weak`s: the registry never keeps them
//! alive, and once the last `Rc` is gone the entry is pruned the next time
//! the registry notifies.
//!
//! Notification takes a snapshot of the live observers first and releases
//! the registry borrow before calling any of them, so observers may
//! subscribe, unsubscribe, or write to other cells during fan-out.
//!
//! # Failure Modes
//!
//! - **Observer panics**: caught per observer (see
//!   [`NotifyConfig::catch_panics`]), logged, and skipped. The remaining
//!   observers still run.
//! - **Runaway re-entrancy**: the registry tracks its fan-out depth so the
//!   owning observable can refuse writes past
//!   [`NotifyConfig::max_depth`].

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::NotifyConfig;
use crate::error::{CellError, Result};
use crate::id::{ObservableId, SubscriberKey};

/// Something that wants to hear about new values.
///
/// Implemented for every `Fn(&V, ObservableId)` closure. Implement it on a
/// struct and subscribe with an `Rc` of it to get a subscription that is
/// dropped automatically once the struct is no longer referenced.
pub trait Observer<V: ?Sized> {
    /// Called with the new value and the id of the observable that changed.
    fn observe(&self, value: &V, source: ObservableId);
}

impl<V: ?Sized, F> Observer<V> for F
where
    F: Fn(&V, ObservableId),
{
    fn observe(&self, value: &V, source: ObservableId) {
        self(value, source);
    }
}

enum Slot<V: ?Sized> {
    Strong(Rc<dyn Observer<V>>),
    Weak(Weak<dyn Observer<V>>),
}

impl<V: ?Sized> Slot<V> {
    fn upgrade(&self) -> Option<Rc<dyn Observer<V>>> {
        match self {
            Self::Strong(observer) => Some(Rc::clone(observer)),
            Self::Weak(observer) => observer.upgrade(),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(observer) => observer.strong_count() > 0,
        }
    }
}

struct Entry<V: ?Sized> {
    key: SubscriberKey,
    slot: Slot<V>,
}

/// Decrements the fan-out depth even if an observer unwinds.
struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Subscriber registry owned by one observable.
pub struct Observers<V: ?Sized> {
    owner: ObservableId,
    config: NotifyConfig,
    entries: RefCell<Vec<Entry<V>>>,
    depth: Cell<usize>,
}

impl<V: ?Sized> fmt::Debug for Observers<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("owner", &self.owner)
            .field("entries", &self.entries.borrow().len())
            .field("depth", &self.depth.get())
            .finish()
    }
}

impl<V: ?Sized + 'static> Observers<V> {
    /// Create an empty registry for the observable `owner`.
    #[must_use]
    pub fn new(owner: ObservableId, config: NotifyConfig) -> Self {
        Self {
            owner,
            config,
            entries: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    /// Id of the observable this registry belongs to.
    #[must_use]
    pub fn owner(&self) -> ObservableId {
        self.owner
    }

    /// Configuration used for fan-out.
    #[must_use]
    pub fn config(&self) -> NotifyConfig {
        self.config
    }

    /// Register an observer the registry keeps alive.
    pub fn insert(&self, observer: Rc<dyn Observer<V>>) -> SubscriberKey {
        self.push(Slot::Strong(observer))
    }

    /// Register an observer the registry only references weakly.
    pub fn insert_weak(&self, observer: Weak<dyn Observer<V>>) -> SubscriberKey {
        self.push(Slot::Weak(observer))
    }

    fn push(&self, slot: Slot<V>) -> SubscriberKey {
        let key = SubscriberKey::next();
        self.entries.borrow_mut().push(Entry { key, slot });
        key
    }

    /// Remove an entry. Returns `false` if it was already gone.
    pub fn remove(&self, key: SubscriberKey) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.key != key);
        entries.len() != before
    }

    /// Number of entries whose observer is still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.slot.is_alive())
            .count()
    }

    /// Whether no live observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current nested fan-out depth (0 outside of notification).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Fail if starting another fan-out would exceed the configured depth.
    pub fn check_depth(&self) -> Result<()> {
        let depth = self.depth.get();
        if depth >= self.config.max_depth {
            warn!(
                observable = %self.owner,
                depth,
                limit = self.config.max_depth,
                "re-entrant write rejected"
            );
            return Err(CellError::ReentrancyLimit {
                id: self.owner,
                depth,
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    /// Snapshot the live observers in registration order, pruning dead
    /// weak entries.
    fn live(&self) -> SmallVec<[Rc<dyn Observer<V>>; 4]> {
        let mut entries = self.entries.borrow_mut();
        let mut live = SmallVec::with_capacity(entries.len());
        let before = entries.len();
        entries.retain(|entry| match entry.slot.upgrade() {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => false,
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(observable = %self.owner, pruned, "pruned dead observers");
        }
        live
    }

    /// Deliver `value` to every live observer. Returns how many observers
    /// were invoked.
    pub fn notify(&self, value: &V) -> usize {
        let observers = self.live();
        let _guard = DepthGuard::enter(&self.depth);
        trace!(
            observable = %self.owner,
            observers = observers.len(),
            depth = self.depth.get(),
            "notify"
        );
        for observer in &observers {
            if self.config.catch_panics {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| observer.observe(value, self.owner)));
                if let Err(payload) = outcome {
                    warn!(
                        observable = %self.owner,
                        panic = panic_message(payload.as_ref()),
                        "observer panicked; continuing fan-out"
                    );
                }
            } else {
                observer.observe(value, self.owner);
            }
        }
        observers.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
