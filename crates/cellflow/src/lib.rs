#![forbid(unsafe_code)]

//! cellflow public facade crate.
//!
//! Re-exports the value cells of `cellflow-core` and, with the default
//! `array` feature, the observable arrays of `cellflow-array`.
//!
//! ```
//! use cellflow::prelude::*;
//!
//! let count = Observable::new(2);
//! let label = derive(&count, |n: &i32, _| format!("{n} items"));
//! count.set(3);
//! assert_eq!(label.get(), "3 items");
//! ```

pub use cellflow_core::{
    CellError, Comparator, Derived, MaybeObservable, NotifyConfig, Observable, ObservableId,
    Observer, Source, Subscription, concat, derive, derive_with, join, join2, join3,
};

#[cfg(feature = "array")]
pub use cellflow_array as array;
#[cfg(feature = "array")]
pub use cellflow_array::{
    ArrayError, ElementId, MappedArray, MutableArray, ObservableArray, ObservedArray, Snapshot,
    mapper,
};

pub mod prelude {
    pub use cellflow_core::{
        Comparator, Derived, MaybeObservable, NotifyConfig, Observable, ObservableId, Observer,
        Source, Subscription, concat, derive, derive_with, join, join2, join3,
    };

    #[cfg(feature = "array")]
    pub use cellflow_array::{MappedArray, MutableArray, ObservableArray, ObservedArray, Snapshot};
}
