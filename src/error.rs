//! Error types for the FortiOS field mapper.

use thiserror::Error;

/// Errors that can occur while mapping fields or dispatching CRUD calls.
#[derive(Debug, Error)]
pub enum MapperError {
    /// A value did not have the kind its field spec expects.
    #[error("Type mismatch at '{path}': expected {expected}, got {found}")]
    TypeMismatch {
        /// Local path of the offending field.
        path: String,
        /// The kind the field spec declares.
        expected: &'static str,
        /// The kind that was actually present.
        found: &'static str,
    },

    /// The REST client failed. Surfaced unchanged.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The requested object was not found.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The requested resource type is not registered.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Local configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A config tree path could not be resolved for writing.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MapperError {
    /// Build a type mismatch error for `path`.
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected,
            found,
        }
    }

    /// Get the error message as a string.
    ///
    /// For [`MapperError::TypeMismatch`] this is the field path.
    pub fn message(&self) -> &str {
        match self {
            Self::TypeMismatch { path, .. } => path,
            Self::Transport(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::InvalidPath(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// Whether this error belongs to a single field rather than the whole call.
    pub fn is_field_error(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
