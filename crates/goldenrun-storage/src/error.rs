//! Storage error types for goldenrun-storage.
//!
//! [`StorageError`] covers the failure modes of the record store: the SQLite
//! layer itself, schema migration, payload encoding, and per-row decoding.

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An underlying SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Encoding a payload to JSON failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored payload could not be decoded.
    #[error("record {id}: cannot decode {column}: {source}")]
    Decode {
        id: i64,
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A stored timestamp is not valid RFC 3339.
    #[error("record {id}: bad timestamp '{value}': {source}")]
    Timestamp {
        id: i64,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
