//! Controller error types.

use ephem_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors surfaced by the convergence and aggregation managers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A store call failed. Not-found has already been handled where it is
    /// expected, so anything reaching the caller is real.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Required configuration is missing or unusable.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ControllerError {
    /// Whether a plain retry can succeed. Configuration errors persist until
    /// the configuration changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(StoreError::Invalid(_)) => false,
            Self::Store(_) => true,
            Self::Validation(_) => false,
        }
    }
}
