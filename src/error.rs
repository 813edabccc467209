// src/error.rs

//! Unified error handling for the ingestion pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The store medium could not be reached, created or written
    #[error("Storage unavailable ({context}): {message}")]
    StorageUnavailable { context: String, message: String },

    /// The listing source returned an error
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// An external call did not finish within its budget
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// The notification sink rejected or failed a dispatch
    #[error("Notify failed: {0}")]
    NotifyFailed(String),

    /// A duplicate identity showed up where none may exist
    #[error("Integrity violation for '{identity}': {message}")]
    IntegrityViolation { identity: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV snapshot encoding/decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// SQLite backend error
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an integrity violation for a specific identity.
    pub fn integrity(identity: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::IntegrityViolation {
            identity: identity.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error.
    pub fn fetch(message: impl fmt::Display) -> Self {
        Self::FetchFailed(message.to_string())
    }

    /// Create a notification error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::NotifyFailed(message.to_string())
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error must end the run in the failed state.
    ///
    /// Fetch, timeout and notify errors are absorbed by their stages.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::FetchFailed(_) | Self::Timeout { .. } | Self::NotifyFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::storage("open", "disk gone").is_fatal());
        assert!(AppError::integrity("abc", "duplicate key").is_fatal());
        assert!(!AppError::fetch("boom").is_fatal());
        assert!(!AppError::timeout("fetch", 5).is_fatal());
        assert!(!AppError::notify("502").is_fatal());
    }

    #[test]
    fn test_integrity_message_names_identity() {
        let err = AppError::integrity("job-42", "already stored");
        assert_eq!(
            err.to_string(),
            "Integrity violation for 'job-42': already stored"
        );
    }
}
