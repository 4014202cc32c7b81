//! Core error types for goldenrun-core.
//!
//! Three families live here, split by who raises them:
//! - [`CoreError`]: configuration-time failures (name lookup, class layout).
//! - [`Fault`]: errors raised by the traced program itself. They flow through
//!   [`Runtime::call`](crate::runtime::Runtime::call) untouched.
//! - [`SnapshotError`]: a value could not be detached into a
//!   [`Payload`](crate::payload::Payload).

use thiserror::Error;

/// Configuration-time errors produced by the core object model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No module with this name is registered in the runtime.
    #[error("no module named '{module}'")]
    ModuleNotFound { module: String },

    /// A dotted attribute path could not be walked to the end.
    #[error("module '{module}' has no attribute '{path}'")]
    AttributeNotFound { module: String, path: String },

    /// The bases of a class admit no consistent C3 linearization.
    #[error("cannot create a consistent method resolution order for class '{class}'")]
    InconsistentMro { class: String },
}

/// An error raised by traced code.
///
/// The runtime returns these from calls exactly as the function body
/// produced them; nothing in the tracing layer catches or rewrites them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Argument binding or call-target mismatch.
    #[error("TypeError: {0}")]
    Type(String),

    /// Attribute access on a value that lacks the attribute.
    #[error("AttributeError: '{type_name}' object has no attribute '{name}'")]
    Attribute { type_name: String, name: String },

    /// A function's defining module is not registered in the runtime.
    #[error("ImportError: no module named '{0}'")]
    Import(String),

    /// A user-level exception raised from a function body.
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
}

impl Fault {
    /// Builds a [`Fault::Raised`] with the given exception kind and message.
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Failure to detach a runtime value into a serializable payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The value graph nests deeper than the snapshot limit (usually a cycle).
    #[error("value nests deeper than {limit} levels (cyclic reference?)")]
    TooDeep { limit: usize },

    /// A float value that JSON payloads cannot represent.
    #[error("non-finite float {0} cannot be captured")]
    NonFiniteFloat(String),
}
