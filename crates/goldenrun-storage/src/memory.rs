//! In-memory implementation of [`RecordStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and ephemeral runs.
//! It keeps the same two-level layout as the SQLite backend (a function
//! dimension plus encoded record rows) so both behave identically, including
//! deferred decoding.

use indexmap::{IndexMap, IndexSet};

use goldenrun_core::CallRecord;

use crate::codec;
use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::RecordRow;

#[derive(Debug, Clone)]
struct StoredRow {
    /// Position of the row's `(module, qualname)` in `functions`.
    function: usize,
    id: i64,
    created_at: String,
    captured: bool,
    serialized_args: Vec<u8>,
    serialized_return: Option<Vec<u8>>,
}

/// In-memory implementation of [`RecordStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    functions: IndexSet<(String, String)>,
    rows: Vec<StoredRow>,
    next_row_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored record rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn function_key(&self, row: &StoredRow) -> Option<&(String, String)> {
        self.functions.get_index(row.function)
    }

    /// Rows matching `pred`, newest first, at most `limit`.
    fn select<F>(&self, limit: usize, pred: F) -> Vec<RecordRow>
    where
        F: Fn(&str, &str) -> bool,
    {
        let mut matched: Vec<RecordRow> = self
            .rows
            .iter()
            .filter_map(|row| {
                let (module, qualname) = self.function_key(row)?;
                pred(module, qualname).then(|| RecordRow {
                    id: row.id,
                    module: module.clone(),
                    qualname: qualname.clone(),
                    created_at: row.created_at.clone(),
                    captured: row.captured,
                    serialized_args: row.serialized_args.clone(),
                    serialized_return: row.serialized_return.clone(),
                })
            })
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matched.truncate(limit);
        matched
    }
}

impl RecordStore for InMemoryStore {
    fn add(&mut self, records: &[CallRecord]) -> Result<(), StorageError> {
        // Encode the whole batch before touching any state.
        let encoded = records
            .iter()
            .map(|r| {
                Ok((
                    codec::encode_args(&r.args)?,
                    codec::encode_return(r.return_value.as_ref())?,
                ))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        for (record, (args, ret)) in records.iter().zip(encoded) {
            let key = (record.module().to_string(), record.qualname().to_string());
            let (function, _) = self.functions.insert_full(key);

            self.next_row_id += 1;
            self.rows.push(StoredRow {
                function,
                id: self.next_row_id,
                created_at: codec::now_timestamp(),
                captured: record.captured,
                serialized_args: args,
                serialized_return: ret,
            });
        }
        Ok(())
    }

    fn get_records(&self, qualname: &str, limit: usize) -> Result<Vec<RecordRow>, StorageError> {
        Ok(self.select(limit, |_, q| q == qualname))
    }

    fn filter(
        &self,
        module: &str,
        qualname_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordRow>, StorageError> {
        Ok(self.select(limit, |m, q| {
            m == module && qualname_prefix.map_or(true, |p| q.starts_with(p))
        }))
    }

    fn list_modules(&self) -> Result<Vec<String>, StorageError> {
        let mut latest: IndexMap<&str, (&str, i64)> = IndexMap::new();
        for row in &self.rows {
            let Some((module, _)) = self.function_key(row) else {
                continue;
            };
            let entry = latest.entry(module.as_str()).or_insert((row.created_at.as_str(), row.id));
            if (row.created_at.as_str(), row.id) > *entry {
                *entry = (row.created_at.as_str(), row.id);
            }
        }
        let mut modules: Vec<(&str, (&str, i64))> = latest.into_iter().collect();
        modules.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(modules.into_iter().map(|(m, _)| m.to_string()).collect())
    }
}
