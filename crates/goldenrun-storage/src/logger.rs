//! The record sink: a batching [`RecordLogger`] backed by a [`RecordStore`].

use goldenrun_core::{CallRecord, RecordLogger};

use crate::error::StorageError;
use crate::traits::RecordStore;

/// Buffers records in memory and writes them to `store` on [`flush`].
///
/// A failed flush leaves the buffer intact so the whole batch can be
/// retried.
///
/// [`flush`]: RecordLogger::flush
#[derive(Debug)]
pub struct StoreLogger<S> {
    store: S,
    buffer: Vec<CallRecord>,
}

impl<S: RecordStore> StoreLogger<S> {
    pub fn new(store: S) -> Self {
        StoreLogger {
            store,
            buffer: Vec::new(),
        }
    }

    /// Records logged since the last successful flush.
    pub fn pending(&self) -> &[CallRecord] {
        &self.buffer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gives back the store. Unflushed records are dropped.
    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: RecordStore> RecordLogger for StoreLogger<S> {
    type Error = StorageError;

    fn log(&mut self, record: CallRecord) {
        self.buffer.push(record);
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.store.add(&self.buffer)?;
        tracing::info!(count = self.buffer.len(), "flushed call records");
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use goldenrun_core::{CallableIdentity, Payload};

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::types::RecordRow;

    /// Fails the first `failures` adds, then delegates.
    struct Flaky {
        failures: usize,
        inner: InMemoryStore,
    }

    impl RecordStore for Flaky {
        fn add(&mut self, records: &[CallRecord]) -> Result<(), StorageError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(StorageError::Migration("store unavailable".into()));
            }
            self.inner.add(records)
        }

        fn get_records(&self, qualname: &str, limit: usize) -> Result<Vec<RecordRow>, StorageError> {
            self.inner.get_records(qualname, limit)
        }

        fn filter(
            &self,
            module: &str,
            qualname_prefix: Option<&str>,
            limit: usize,
        ) -> Result<Vec<RecordRow>, StorageError> {
            self.inner.filter(module, qualname_prefix, limit)
        }

        fn list_modules(&self) -> Result<Vec<String>, StorageError> {
            self.inner.list_modules()
        }
    }

    fn record(qualname: &str) -> CallRecord {
        CallRecord::new(CallableIdentity::new("app", qualname, true), IndexMap::new())
            .with_return(Payload::None)
    }

    #[test]
    fn log_buffers_until_flush() {
        let mut logger = StoreLogger::new(InMemoryStore::new());
        logger.log(record("f"));
        logger.log(record("g"));
        assert_eq!(logger.pending().len(), 2);
        assert!(logger.store().is_empty());

        logger.flush().unwrap();
        assert!(logger.pending().is_empty());
        assert_eq!(logger.into_store().len(), 2);
    }

    #[test]
    fn failed_flush_keeps_batch_for_retry() {
        let mut logger = StoreLogger::new(Flaky {
            failures: 1,
            inner: InMemoryStore::new(),
        });
        logger.log(record("f"));

        assert!(logger.flush().is_err());
        assert_eq!(logger.pending().len(), 1);

        logger.flush().unwrap();
        assert!(logger.pending().is_empty());
        assert_eq!(logger.store().inner.len(), 1);
    }
}
