#![forbid(unsafe_code)]

//! Read-only arrays assembled from constants and observables.

use std::fmt;
use std::rc::{Rc, Weak};

use cellflow_core::{
    Comparator, Detach, MaybeObservable, NotifyConfig, ObservableId, Observer, Source, Subscription,
};
use tracing::debug;

use crate::store::{
    ArrayCore, ElementSet, ObservableArray, Snapshot, subscribe_snapshot, subscribe_snapshot_weak,
};

/// An array whose elements follow individual observables.
///
/// Each reactive input is bound to one element. When the input fires, that
/// element's value is replaced in place and the array notifies with just
/// that element flagged, so mapped arrays recompute a single entry.
pub struct ObservedArray<T> {
    core: Rc<ArrayCore<T>>,
}

impl<T> Clone for ObservedArray<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObservedArray").field(&self.core).finish()
    }
}

impl<T: Clone + 'static> ObservedArray<T> {
    /// Build the array from `inputs`, subscribing to every reactive one.
    ///
    /// The configuration is taken from the first reactive input.
    #[must_use]
    pub fn new(inputs: Vec<MaybeObservable<T>>) -> Self {
        let config = inputs
            .iter()
            .find_map(MaybeObservable::config)
            .unwrap_or_default();
        let values = inputs.iter().map(MaybeObservable::get);
        let core = Rc::new(ArrayCore::new(values, Comparator::never(), config));

        for (index, input) in inputs.into_iter().enumerate() {
            let MaybeObservable::Observed(source) = input else {
                continue;
            };
            let Some(element) = core.element(index) else {
                continue;
            };
            let weak_core: Weak<ArrayCore<T>> = Rc::downgrade(&core);
            let sub = source.subscribe_dyn(Rc::new(move |value: &T, _: ObservableId| {
                let Some(core) = weak_core.upgrade() else {
                    return;
                };
                element.replace(value.clone());
                let mut changed = ElementSet::default();
                changed.insert(element.id());
                core.notify_changes(changed);
            }));
            core.attach(sub);
        }

        Self { core }
    }

    /// Stop following the inputs. The values are frozen where they are.
    pub fn destroy(&self) {
        let released = self.core.release_upstream();
        debug!(array = %self.core.id(), released, "observed array destroyed");
    }

    /// Whether the array still follows at least one input.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.core.upstream_count() > 0
    }
}

impl<T: Clone + 'static> ObservableArray<T> for ObservedArray<T> {
    fn core(&self) -> &ArrayCore<T> {
        &self.core
    }

    fn keep_alive(&self) -> Rc<dyn Detach> {
        self.core.clone()
    }
}

impl<T: Clone + 'static> Source<Snapshot<T>> for ObservedArray<T> {
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
