//! Error types for object decoding and validation.

use thiserror::Error;

/// Errors that can occur when decoding or validating objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The manifest names a kind nobody registered.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// The manifest has no `kind` field.
    #[error("manifest is missing the `kind` field")]
    MissingKind,

    /// The object failed validation.
    #[error("invalid {kind} {name:?}: {reason}")]
    Invalid {
        kind: String,
        name: String,
        reason: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ObjectError {
    fn from(err: serde_json::Error) -> Self {
        ObjectError::Serialization(err.to_string())
    }
}
