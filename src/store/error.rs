//! Knowledge store error types.

use std::path::PathBuf;

/// Errors that can occur during knowledge store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A required field was missing or blank.
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },

    /// An argument was outside the range the operation accepts.
    #[error("Invalid argument to {operation}: {message}")]
    InvalidArgument {
        operation: &'static str,
        message: String,
    },

    /// No entry exists with the given id.
    #[error("Entry with id {id} not found")]
    NotFound { id: i64 },

    /// A bulk delete was attempted without explicit confirmation.
    #[error("Confirmation required for {operation}")]
    ConfirmationRequired { operation: &'static str },

    /// The underlying storage could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Failed to open or create database.
    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create parent directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to execute SQL.
    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to encode or decode metadata.
    #[error("Metadata codec failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,
}

impl StoreError {
    /// Stable tag for the error category, used in API error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::NotFound { .. } => "not_found",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::Unavailable(_) | Self::DatabaseOpen { .. } | Self::CreateDir { .. } => {
                "unavailable"
            }
            Self::Query(_) | Self::Codec(_) | Self::TaskCancelled => "internal",
        }
    }

    /// Whether the error means the store itself is down rather than the request being bad.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.kind() == "unavailable"
    }

    pub(crate) fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            message: message.into(),
        }
    }
}
