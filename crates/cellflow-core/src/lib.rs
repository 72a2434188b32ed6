#![forbid(unsafe_code)]

//! Observable cells and derived values.
//!
//! This crate provides the change-notification primitives the rest of
//! cellflow is built on:
//!
//! - [`Observable`]: a shared, version-tracked value cell that notifies its
//!   subscribers when a write changes the value.
//! - [`Observers`]: the per-observable registry of subscribers. Closures are
//!   held strongly, object observers weakly.
//! - [`Subscription`]: RAII guard that unsubscribes on drop and keeps the
//!   observable it was taken on alive.
//! - [`Derived`]: a read-only cell recomputed eagerly from one or more
//!   sources ([`derive`], [`join`], [`join2`], [`join3`], [`concat`]).
//!
//! # Architecture
//!
//! Every observable lives behind `Rc`. Registries hold object observers as
//! `Weak` and prune them lazily during notification. A `Subscription` holds a
//! strong handle on its observable, so ownership always points upstream:
//! derived values own their sources, sources only reach their dependents
//! through the registry.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per write the comparator accepts.
//! 2. Subscribers are notified in registration order.
//! 3. Writing a value the comparator considers equal is a no-op.
//! 4. Dropping a [`Subscription`] removes the observer before the next
//!    notification cycle.
//! 5. A panicking observer never prevents the remaining observers from
//!    running and never unwinds into the writer.

pub mod comparator;
pub mod config;
pub mod derived;
pub mod error;
pub mod id;
pub mod join;
pub mod observable;
pub mod observer;
pub mod source;
pub mod subscription;

pub use comparator::Comparator;
pub use config::NotifyConfig;
pub use derived::{Derived, derive, derive_with};
pub use error::CellError;
pub use id::{ObservableId, SubscriberKey};
pub use join::{concat, join, join2, join3};
pub use observable::Observable;
pub use observer::{Observer, Observers};
pub use source::{MaybeObservable, Source};
pub use subscription::{Detach, Subscription};
