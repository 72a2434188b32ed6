use thiserror::Error;

use crate::id::ObservableId;

pub type Result<T> = std::result::Result<T, CellError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("re-entrant write on {id} at notification depth {depth} (limit {limit})")]
    ReentrancyLimit {
        id: ObservableId,
        depth: usize,
        limit: usize,
    },
}
