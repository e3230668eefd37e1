//! Error types for session-store I/O

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing session stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// Gave up waiting for another writer to release an inbox lock
    #[error("Gave up waiting for lock on {path} after {waited_ms} ms")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse JSON
    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Input rejected before any store was touched
    #[error("{message}")]
    InvalidInput { message: String },

    /// Operation conflicts with existing state (duplicate id, resolved
    /// request, lead removal)
    #[error("{message}")]
    Conflict { message: String },

    /// Referenced record does not exist
    #[error("{what} not found: {ident}")]
    NotFound { what: &'static str, ident: String },
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}
