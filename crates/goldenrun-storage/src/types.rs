//! Storage-layer row and record types.
//!
//! [`RecordRow`] is a raw row as read from a backend. Decoding is deferred to
//! [`RecordRow::to_record`] so that one unreadable row does not spoil the
//! rest of a query result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use goldenrun_core::{CallRecord, CallableIdentity, Payload};

use crate::codec::{self, Bindings};
use crate::error::StorageError;

/// Row ID in the `functions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub i64);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionId({})", self.0)
    }
}

/// An undecoded record row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub id: i64,
    pub module: String,
    pub qualname: String,
    pub created_at: String,
    pub captured: bool,
    pub serialized_args: Vec<u8>,
    pub serialized_return: Option<Vec<u8>>,
}

impl RecordRow {
    /// Decodes this row.
    pub fn to_record(&self) -> Result<StoredRecord, StorageError> {
        Ok(StoredRecord {
            id: self.id,
            module: self.module.clone(),
            qualname: self.qualname.clone(),
            created_at: codec::parse_timestamp(self.id, &self.created_at)?,
            captured: self.captured,
            args: codec::decode_args(self.id, &self.serialized_args)?,
            return_value: codec::decode_return(self.id, self.serialized_return.as_deref())?,
        })
    }
}

/// A decoded record as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub module: String,
    pub qualname: String,
    pub created_at: DateTime<Utc>,
    pub captured: bool,
    pub args: Bindings,
    pub return_value: Option<Payload>,
}

impl StoredRecord {
    /// The call record this row was stored from. Marker state is not
    /// persisted beyond `captured`, so the identity's `marked` mirrors it.
    pub fn to_call_record(&self) -> CallRecord {
        CallRecord {
            captured: self.captured,
            function: CallableIdentity::new(&self.module, &self.qualname, self.captured),
            args: self.args.clone(),
            return_value: self.return_value.clone(),
        }
    }
}
