//! Store error types.

use ephem_objects::{Kind, ObjectKey};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by [`crate::ObjectStore`] implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No object under this key.
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    /// Create raced with another writer, or the object already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Update carried a stale or missing version token.
    #[error("conflict updating {kind} {key}: expected version {expected:?}, stored {actual}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: Option<String>,
        actual: String,
    },

    /// The store rejected the object outright.
    #[error("invalid object: {0}")]
    Invalid(String),

    /// The store returned an object of another kind than requested.
    #[error("expected {expected}, store returned {actual}")]
    KindMismatch { expected: Kind, actual: Kind },

    /// Network, timeout or other transient failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error is a race the next attempt may win.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::Conflict { .. })
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        self.is_conflict() || matches!(self, Self::Unavailable(_))
    }
}
