//! Storage for captured call records.
//!
//! Provides the [`RecordStore`] trait defining the storage contract, the
//! [`SqliteStore`] and [`InMemoryStore`] backends, and [`StoreLogger`], the
//! batching sink the tracer logs into.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: FunctionId, RecordRow, StoredRecord
//! - [`traits`]: RecordStore trait definition
//! - [`codec`]: payload and timestamp column encodings
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema and migration setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`logger`]: StoreLogger record sink

pub mod codec;
pub mod error;
pub mod logger;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use logger::StoreLogger;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{RecordStore, DEFAULT_QUERY_LIMIT};
pub use types::{FunctionId, RecordRow, StoredRecord};
