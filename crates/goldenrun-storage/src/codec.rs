//! Column encodings shared by every backend.
//!
//! Payloads are stored as JSON bytes. Timestamps are RFC 3339 UTC strings
//! with microsecond precision, so lexical order equals time order.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

use goldenrun_core::Payload;

use crate::error::StorageError;

pub type Bindings = IndexMap<String, Payload>;

pub fn encode_args(args: &Bindings) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(args)?)
}

pub fn encode_return(value: Option<&Payload>) -> Result<Option<Vec<u8>>, StorageError> {
    value
        .map(|v| serde_json::to_vec(v).map_err(StorageError::from))
        .transpose()
}

pub fn decode_args(id: i64, bytes: &[u8]) -> Result<Bindings, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Decode {
        id,
        column: "serialized_args",
        source,
    })
}

pub fn decode_return(id: i64, bytes: Option<&[u8]>) -> Result<Option<Payload>, StorageError> {
    bytes
        .map(|b| {
            serde_json::from_slice(b).map_err(|source| StorageError::Decode {
                id,
                column: "serialized_return",
                source,
            })
        })
        .transpose()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_timestamp(id: i64, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| StorageError::Timestamp {
            id,
            value: value.to_string(),
            source,
        })
}
