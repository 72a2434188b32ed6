use cellflow_core::CellError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArrayError>;

/// Usage errors reported by mutable array operations. A failed operation
/// leaves the array untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// `set` started past the end; `target` may be at most `len`.
    #[error("cannot set at {target}: outside the array bounds (len {len})")]
    SetOutOfBounds { target: usize, len: usize },

    /// `insert` position past the end.
    #[error("cannot insert at {target}: outside the array bounds (len {len})")]
    InsertOutOfBounds { target: usize, len: usize },

    /// The range to move does not lie inside the array.
    // `source` would be taken by thiserror as the error cause.
    #[error("cannot move {length} element(s) from {start}: outside the array bounds (len {len})")]
    MoveSourceOutOfBounds {
        start: usize,
        length: usize,
        len: usize,
    },

    /// The move target is past the end.
    #[error("cannot move to {target}: outside the array bounds (len {len})")]
    MoveTargetOutOfBounds { target: usize, len: usize },

    /// The move target falls inside the range being moved.
    #[error("move target {target} lies inside the moved range {start}..={end}")]
    MoveTargetInsideRange {
        start: usize,
        target: usize,
        end: usize,
    },

    /// The edit was issued too deep inside a notification fan-out.
    #[error(transparent)]
    Cell(#[from] CellError),
}
