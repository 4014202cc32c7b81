//! The [`RecordStore`] trait defining the storage contract for call records.
//!
//! Both backends ([`InMemoryStore`](crate::memory::InMemoryStore) and
//! [`SqliteStore`](crate::sqlite::SqliteStore)) implement it with identical
//! semantics, so they are swappable without changing the tracing layer.

use goldenrun_core::CallRecord;

use crate::error::StorageError;
use crate::types::RecordRow;

/// Row limit used when a query does not name one.
pub const DEFAULT_QUERY_LIMIT: usize = 2000;

/// The storage contract for captured call records.
///
/// The trait is synchronous; callers serialize writes against one store.
pub trait RecordStore {
    /// Persists a batch atomically.
    ///
    /// Each record gets (or reuses) a function row for its
    /// `(module, qualname)` and a new record row stamped with the current
    /// time. Either every record in the batch is stored or none is.
    fn add(&mut self, records: &[CallRecord]) -> Result<(), StorageError>;

    /// Up to `limit` rows for `qualname` across all modules, newest first.
    fn get_records(&self, qualname: &str, limit: usize) -> Result<Vec<RecordRow>, StorageError>;

    /// Up to `limit` rows of `module`, newest first, optionally restricted to
    /// qualnames starting with `qualname_prefix`.
    fn filter(
        &self,
        module: &str,
        qualname_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordRow>, StorageError>;

    /// Distinct module names that have records, most recently active first.
    fn list_modules(&self) -> Result<Vec<String>, StorageError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn add(&mut self, records: &[CallRecord]) -> Result<(), StorageError> {
        (**self).add(records)
    }

    fn get_records(&self, qualname: &str, limit: usize) -> Result<Vec<RecordRow>, StorageError> {
        (**self).get_records(qualname, limit)
    }

    fn filter(
        &self,
        module: &str,
        qualname_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordRow>, StorageError> {
        (**self).filter(module, qualname_prefix, limit)
    }

    fn list_modules(&self) -> Result<Vec<String>, StorageError> {
        (**self).list_modules()
    }
}
