#![forbid(unsafe_code)]

//! Observable arrays with identity-preserving incremental mapping.
//!
//! Values live in [`Element`] boxes whose identity survives every edit that
//! does not remove them. Derived arrays diff their source by box identity,
//! so an insert, delete, or move in the source reuses every existing output
//! element and only elements whose source value changed are recomputed.
//!
//! - [`MutableArray`]: the writable array (`set`, `insert`, `delete`,
//!   `move_within`, `replace`, ...).
//! - [`MappedArray`]: an array derived element-wise, built with
//!   [`ObservableArray::map`], [`map_with`](ObservableArray::map_with) or
//!   [`map_observed`](ObservableArray::map_observed).
//! - [`ObservedArray`]: a read-only array whose elements follow individual
//!   observables.
//!
//! All arrays implement [`ObservableArray`] for reads and subscriptions and
//! [`Source`](cellflow_core::Source) of their [`Snapshot`], so they compose
//! with [`derive`](cellflow_core::derive) and friends.
//!
//! # Example
//!
//! ```
//! use cellflow_array::{MutableArray, ObservableArray};
//!
//! let source = MutableArray::new(vec![4, 6, 56, 23, 89, 83]);
//! let doubled = source.map(|v| v * 2);
//! let kept = doubled.element_id(0);
//!
//! source.set_at(4, 3).unwrap();
//! source.delete(1, 1);
//! assert_eq!(&*doubled.value(), &[8, 112, 46, 6, 166]);
//! assert_eq!(doubled.element_id(0), kept);
//! ```

pub mod element;
pub mod error;
pub mod mapped;
pub mod mutable;
pub mod observed;
pub mod store;

pub use element::{Element, ElementId};
pub use error::ArrayError;
pub use mapped::{MappedArray, Mapper, mapper};
pub use mutable::MutableArray;
pub use observed::ObservedArray;
pub use store::{ArrayChange, ArrayCore, ElementSet, ObservableArray, Snapshot, SnapshotIter};
