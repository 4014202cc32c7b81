//! Error types for goldenrun-trace.

use goldenrun_core::{CoreError, SnapshotError};
use goldenrun_storage::StorageError;
use thiserror::Error;

/// Errors produced while configuring or running a trace session.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A value could not be captured.
    #[error("capture failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A capture path was not of the form `<module>:<qualname>`.
    #[error("invalid path '{0}': expected <module>:<qualname>")]
    InvalidPath(String),

    /// A capture path named something other than a function.
    #[error("'{path}' is a {type_name}, not a function")]
    NotCallable { path: String, type_name: String },

    /// A name could not be looked up in the runtime.
    #[error(transparent)]
    Lookup(#[from] CoreError),

    /// Opening the record store failed.
    #[error("record store: {0}")]
    Storage(#[from] StorageError),

    /// The record sink failed to flush at session end.
    #[error("flushing call records failed: {0}")]
    Flush(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The tracer is still referenced (typically still installed as a
    /// runtime hook), so its logger cannot be recovered.
    #[error("tracer is still installed; cannot recover its logger")]
    TracerStillInstalled,

    /// The tracer's own bookkeeping panicked.
    #[error("internal tracer failure: {0}")]
    Internal(String),
}
