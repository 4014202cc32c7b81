//! Call records and the sink interface they are handed to.

use std::convert::Infallible;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::object::Function;
use crate::payload::Payload;

/// A resolved, named callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableIdentity {
    pub module: String,
    pub qualname: String,
    /// Whether this callable is marked for capture.
    pub marked: bool,
}

impl CallableIdentity {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>, marked: bool) -> Self {
        CallableIdentity {
            module: module.into(),
            qualname: qualname.into(),
            marked,
        }
    }

    pub fn of(function: &Function, marked: bool) -> Self {
        Self::new(function.module(), function.qualname(), marked)
    }

    /// `module.qualname`.
    pub fn funcname(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }
}

/// One captured invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Whether the invoked function itself is marked, as opposed to being
    /// called underneath a marked one.
    pub captured: bool,
    pub function: CallableIdentity,
    /// Declared parameters in declaration order, as bound at entry.
    pub args: IndexMap<String, Payload>,
    pub return_value: Option<Payload>,
}

impl CallRecord {
    pub fn new(function: CallableIdentity, args: IndexMap<String, Payload>) -> Self {
        CallRecord {
            captured: function.marked,
            function,
            args,
            return_value: None,
        }
    }

    pub fn with_return(mut self, value: Payload) -> Self {
        self.return_value = Some(value);
        self
    }

    pub fn module(&self) -> &str {
        &self.function.module
    }

    pub fn qualname(&self) -> &str {
        &self.function.qualname
    }
}

/// Receives finished call records.
///
/// `log` must not do I/O; `flush` hands everything logged so far to
/// durable storage and clears it.
pub trait RecordLogger {
    type Error: std::error::Error + Send + Sync + 'static;

    fn log(&mut self, record: CallRecord);

    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Collects records in memory. `flush` is a no-op.
impl RecordLogger for Vec<CallRecord> {
    type Error = Infallible;

    fn log(&mut self, record: CallRecord) {
        self.push(record);
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}
