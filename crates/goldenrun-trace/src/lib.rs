//! Call capture for goldenrun.
//!
//! Installs a [`CallTracer`] on a [`goldenrun_core::Runtime`] for the
//! duration of a [`TraceSession`], and turns the calls made inside a
//! marked function into [`goldenrun_core::CallRecord`]s.
//!
//! # Modules
//!
//! - [`filter`]: which code units are observed at all
//! - [`resolver`]: mapping executing code back to named functions
//! - [`registry`]: functions marked for capture
//! - [`tracer`]: the call/return state machine
//! - [`session`]: scoped install, restore and flush
//! - [`config`]: wiring a session from a store and filter

pub mod config;
pub mod error;
pub mod filter;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod tracer;

pub use config::{trace, Config, DefaultConfig};
pub use error::TraceError;
pub use filter::{CodeFilter, DefaultCodeFilter};
pub use registry::CaptureRegistry;
pub use resolver::{Resolver, ResolverStats};
pub use session::{trace_calls, TraceSession};
pub use tracer::{CallTracer, TraceStats};
