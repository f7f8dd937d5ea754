//! Storage error types for artistlink-storage.
//!
//! [`StorageError`] covers the failure modes of the storage layer:
//! serialization, SQLite and migration failures, malformed rows, and merge
//! policy violations surfaced from the core crate.

use thiserror::Error;

use artistlink_core::{ArtistId, CoreError};

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored row could not be turned back into a record.
    #[error("invalid record '{id}': {reason}")]
    InvalidRecord { id: ArtistId, reason: String },

    /// An edge from an artist to itself was requested.
    #[error("invalid edge: '{id}' cannot connect to itself")]
    SelfEdge { id: ArtistId },

    /// The merge policy rejected the write.
    #[error(transparent)]
    Core(#[from] CoreError),
}
