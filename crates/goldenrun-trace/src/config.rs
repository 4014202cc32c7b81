//! Session configuration.

use std::path::PathBuf;

use goldenrun_core::Runtime;
use goldenrun_storage::{RecordStore, SqliteStore, StoreLogger, DEFAULT_QUERY_LIMIT};

use crate::error::TraceError;
use crate::filter::{parse_module_list, CodeFilter, DefaultCodeFilter, TRACE_MODULES_VAR};
use crate::registry::CaptureRegistry;
use crate::session::trace_calls;
use crate::tracer::CallTracer;

/// Environment variable naming the SQLite database.
pub const DB_PATH_VAR: &str = "GR_DB_PATH";
pub const DEFAULT_DB_PATH: &str = "goldenrun.sqlite3";

/// Supplies the pieces a trace session is wired from.
pub trait Config {
    fn trace_store(&self) -> Result<Box<dyn RecordStore>, TraceError>;

    fn trace_logger(&self) -> Result<StoreLogger<Box<dyn RecordStore>>, TraceError> {
        Ok(StoreLogger::new(self.trace_store()?))
    }

    /// `None` traces every call the runtime reports.
    fn code_filter(&self, _rt: &Runtime) -> Option<Box<dyn CodeFilter>> {
        None
    }

    fn sample_rate(&self) -> Option<u32> {
        None
    }

    fn query_limit(&self) -> usize {
        DEFAULT_QUERY_LIMIT
    }
}

/// SQLite-backed configuration that skips library code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultConfig {
    pub db_path: PathBuf,
    pub trace_modules: Option<Vec<String>>,
}

impl DefaultConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        DefaultConfig {
            db_path: db_path.into(),
            trace_modules: None,
        }
    }

    /// Reads `GR_DB_PATH` and `GOLDENRUN_TRACE_MODULES`.
    pub fn from_env() -> Self {
        let db_path = std::env::var_os(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        DefaultConfig {
            db_path,
            trace_modules: std::env::var(TRACE_MODULES_VAR)
                .ok()
                .map(|list| parse_module_list(&list)),
        }
    }
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

impl Config for DefaultConfig {
    fn trace_store(&self) -> Result<Box<dyn RecordStore>, TraceError> {
        Ok(Box::new(SqliteStore::new(&self.db_path)?))
    }

    fn code_filter(&self, rt: &Runtime) -> Option<Box<dyn CodeFilter>> {
        let filter = DefaultCodeFilter::new(rt.library_roots());
        Some(Box::new(match &self.trace_modules {
            Some(modules) => filter.with_trace_modules(modules.iter().cloned()),
            None => filter,
        }))
    }
}

/// Runs `body` under a session wired from `config`, capturing the
/// functions marked in `registry`. Records are flushed to the configured
/// store when `body` returns.
pub fn trace<C, R, F>(
    rt: &mut Runtime,
    config: &C,
    registry: CaptureRegistry,
    body: F,
) -> Result<R, TraceError>
where
    C: Config + ?Sized,
    F: FnOnce(&mut Runtime) -> R,
{
    let mut tracer = CallTracer::new(config.trace_logger()?, registry);
    if let Some(filter) = config.code_filter(rt) {
        tracer = tracer.with_boxed_filter(filter);
    }
    if let Some(n) = config.sample_rate() {
        tracer = tracer.with_sample_rate(n);
    }
    let (result, _) = trace_calls(rt, tracer, body)?;
    Ok(result)
}
