//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from the file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to the file system.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or deserialize JSON.
    #[error("failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record not found in the store.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A session document could not be decoded and was quarantined.
    #[error("corrupt session document {path} (quarantined to {quarantined})")]
    Corrupt { path: PathBuf, quarantined: PathBuf },

    /// The store lock could not be acquired.
    #[error("could not acquire store lock: {0}")]
    Lock(String),

    /// A schema migration could not be applied.
    #[error("cannot migrate schema version {found}: {reason}")]
    Migration { found: u32, reason: String },
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
