//! SQLite implementation of [`RecordStore`].
//!
//! [`SqliteStore`] keeps call records in the normalized two-table schema
//! (`functions` + `records`) with WAL mode, foreign keys, and automatic
//! schema migrations. Every batch is written in a single transaction.

use std::path::Path;

use rusqlite::{params, Connection, Row};

use goldenrun_core::CallRecord;

use crate::codec;
use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::{FunctionId, RecordRow};

const SELECT_ROWS: &str = "SELECT r.id, f.module, f.qualname, r.created_at, r.captured, \
     r.serialized_args, r.serialized_return \
     FROM records r JOIN functions f ON f.id = r.func_id";

/// SQLite-backed implementation of [`RecordStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    /// Looks up the function row for `(module, qualname)`.
    pub fn function_id(&self, module: &str, qualname: &str) -> Result<Option<FunctionId>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM functions WHERE module = ?1 AND qualname = ?2")?;
        let mut rows = stmt.query(params![module, qualname])?;
        match rows.next()? {
            Some(row) => Ok(Some(FunctionId(row.get(0)?))),
            None => Ok(None),
        }
    }

    fn query_rows(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<RecordRow>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, row_to_record_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        module: row.get(1)?,
        qualname: row.get(2)?,
        created_at: row.get(3)?,
        captured: row.get(4)?,
        serialized_args: row.get(5)?,
        serialized_return: row.get(6)?,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl RecordStore for SqliteStore {
    fn add(&mut self, records: &[CallRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        // Encode everything up front so a bad payload aborts before any write.
        let encoded = records
            .iter()
            .map(|r| {
                Ok((
                    codec::encode_args(&r.args)?,
                    codec::encode_return(r.return_value.as_ref())?,
                ))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO functions (module, qualname) VALUES (?1, ?2) \
                 ON CONFLICT (module, qualname) DO NOTHING",
            )?;
            let mut lookup =
                tx.prepare_cached("SELECT id FROM functions WHERE module = ?1 AND qualname = ?2")?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO records (func_id, created_at, captured, serialized_args, serialized_return) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for (record, (args, ret)) in records.iter().zip(&encoded) {
                upsert.execute(params![record.module(), record.qualname()])?;
                let func_id: i64 =
                    lookup.query_row(params![record.module(), record.qualname()], |row| row.get(0))?;
                insert.execute(params![
                    func_id,
                    codec::now_timestamp(),
                    record.captured,
                    args,
                    ret
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(count = records.len(), "stored call records");
        Ok(())
    }

    fn get_records(&self, qualname: &str, limit: usize) -> Result<Vec<RecordRow>, StorageError> {
        let sql = format!(
            "{SELECT_ROWS} WHERE f.qualname = ?1 ORDER BY r.created_at DESC, r.id DESC LIMIT ?2"
        );
        self.query_rows(&sql, params![qualname, sql_limit(limit)])
    }

    fn filter(
        &self,
        module: &str,
        qualname_prefix: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordRow>, StorageError> {
        match qualname_prefix {
            Some(prefix) => {
                let sql = format!(
                    "{SELECT_ROWS} WHERE f.module = ?1 AND substr(f.qualname, 1, length(?2)) = ?2 \
                     ORDER BY r.created_at DESC, r.id DESC LIMIT ?3"
                );
                self.query_rows(&sql, params![module, prefix, sql_limit(limit)])
            }
            None => {
                let sql = format!(
                    "{SELECT_ROWS} WHERE f.module = ?1 ORDER BY r.created_at DESC, r.id DESC LIMIT ?2"
                );
                self.query_rows(&sql, params![module, sql_limit(limit)])
            }
        }
    }

    fn list_modules(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.module FROM functions f JOIN records r ON r.func_id = f.id \
             GROUP BY f.module ORDER BY MAX(r.created_at) DESC, MAX(r.id) DESC",
        )?;
        let modules = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(modules)
    }
}
