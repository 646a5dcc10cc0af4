//! Error types for the lineage system.

use thiserror::Error;

use crate::path::PathParseError;

/// Result type alias using LineageError.
pub type Result<T> = std::result::Result<T, LineageError>;

/// Errors that can occur at the I/O seams of the lineage system.
///
/// The graph algorithms themselves never fail; pending, error and ambiguous
/// states travel as typed values instead.
#[derive(Error, Debug)]
pub enum LineageError {
    /// Document not found.
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// Derivation path could not be parsed.
    #[error("Invalid path: {path} - {reason}")]
    InvalidPath { path: String, reason: String },

    /// Document cannot be updated in place.
    #[error("Document is not editable in place: {id}")]
    NotEditable { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Sync error.
    #[error("Sync error: {message}")]
    Sync { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LineageError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the stable error code used in tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::InvalidPath { .. } => "INVALID_PATH",
            Self::NotEditable { .. } => "NOT_EDITABLE",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Sync { .. } => "SYNC_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<PathParseError> for LineageError {
    fn from(err: PathParseError) -> Self {
        Self::InvalidPath {
            path: err.input().to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LineageError::DocumentNotFound {
            id: "doc-1".to_string(),
        };
        assert!(err.to_string().contains("doc-1"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LineageError::NotEditable {
                id: "x".to_string()
            }
            .error_code(),
            "NOT_EDITABLE"
        );
        assert_eq!(LineageError::database("test").error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_path_error_conversion() {
        let err: LineageError = "[x]".parse::<crate::DerivationPath>().unwrap_err().into();
        assert_eq!(err.error_code(), "INVALID_PATH");
        assert!(err.to_string().contains("[x]"));
    }
}
