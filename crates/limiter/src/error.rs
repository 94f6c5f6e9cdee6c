use gateway_core::{LimitsError, QueryError};
use thiserror::Error;

/// Failure that aborts a whole limit-setting run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimitError {
    #[error("read rate query failed: {0}")]
    Query(#[from] QueryError),

    #[error("limits store failed: {0}")]
    Limits(#[from] LimitsError),

    #[error("invalid limit policy: {0}")]
    Config(String),
}

impl LimitError {
    /// True when the limits store reported an internal failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, LimitError::Limits(e) if e.is_internal())
    }
}
