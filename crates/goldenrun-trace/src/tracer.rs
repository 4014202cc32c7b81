//! The call-interception engine.
//!
//! [`CallTracer`] is a [`CallHook`]. Installed on a runtime, it watches call
//! and return events, resolves which function each executing frame belongs
//! to, and emits a [`CallRecord`] for every invocation that returns normally
//! while a recording window is open.
//!
//! A window opens when a marked function is entered and closes when every
//! frame entered since then has exited. Calls outside a window cost one
//! filter check and one (cached) resolution; no record is allocated.
//!
//! The tracer never lets its own failures reach the traced program. Errors
//! and panics in its bookkeeping are logged with `tracing::error!`, counted,
//! and the offending event is dropped.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;

use goldenrun_core::{
    CallEvent, CallHook, CallRecord, CodeId, EventKind, ExitKind, Frame, FrameId, Payload,
    RecordLogger, Value,
};

use crate::error::TraceError;
use crate::filter::CodeFilter;
use crate::registry::CaptureRegistry;
use crate::resolver::Resolver;

/// Counters kept by a tracer over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub records_emitted: u64,
    /// Records discarded because the frame suspended (generator yield).
    pub dropped_suspended: u64,
    /// Records discarded because the frame raised.
    pub dropped_exceptional: u64,
    /// Failures inside the tracer itself.
    pub internal_errors: u64,
    pub resolver_cache_hits: u64,
    pub resolver_searches: u64,
    /// Code units no resolution strategy could attribute to a function.
    pub unresolved: u64,
}

struct TracerState<L> {
    logger: L,
    registry: CaptureRegistry,
    filter: Option<Box<dyn CodeFilter>>,
    resolver: Resolver,
    pending: HashMap<FrameId, CallRecord>,
    recording: bool,
    sample_rate: Option<u32>,
    /// Marked entries seen while idle; drives sampling.
    window_candidates: u64,
    ignored: HashSet<CodeId>,
    stats: TraceStats,
}

/// Captures call records for marked functions and everything they call.
pub struct CallTracer<L: RecordLogger> {
    state: RefCell<TracerState<L>>,
}

impl<L: RecordLogger> CallTracer<L> {
    pub fn new(logger: L, registry: CaptureRegistry) -> Self {
        CallTracer {
            state: RefCell::new(TracerState {
                logger,
                registry,
                filter: None,
                resolver: Resolver::new(),
                pending: HashMap::new(),
                recording: false,
                sample_rate: None,
                window_candidates: 0,
                ignored: HashSet::new(),
                stats: TraceStats::default(),
            }),
        }
    }

    /// Only code accepted by `filter` is observed.
    pub fn with_filter<F: CodeFilter + 'static>(self, filter: F) -> Self {
        self.with_boxed_filter(Box::new(filter))
    }

    pub fn with_boxed_filter(self, filter: Box<dyn CodeFilter>) -> Self {
        self.state.borrow_mut().filter = Some(filter);
        self
    }

    /// Opens a recording window on every `n`-th marked entry only. Marked
    /// entries inside an open window are always captured. `0` is treated
    /// as `1`.
    pub fn with_sample_rate(self, n: u32) -> Self {
        self.state.borrow_mut().sample_rate = Some(n.max(1));
        self
    }

    pub fn with_resolver(self, resolver: Resolver) -> Self {
        self.state.borrow_mut().resolver = resolver;
        self
    }

    /// Never observe `code` (e.g. a harness function that drives the
    /// session from inside the runtime).
    pub fn ignore_code(self, code: CodeId) -> Self {
        self.state.borrow_mut().ignored.insert(code);
        self
    }

    pub fn is_recording(&self) -> bool {
        self.state.borrow().recording
    }

    /// Frames entered inside the current window that have not exited yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn stats(&self) -> TraceStats {
        let state = self.state.borrow();
        let resolver = state.resolver.stats();
        TraceStats {
            resolver_cache_hits: resolver.cache_hits,
            resolver_searches: resolver.searches,
            unresolved: resolver.unresolved,
            ..state.stats
        }
    }

    /// Flushes the logger.
    pub fn flush(&self) -> Result<(), L::Error> {
        self.state.borrow_mut().logger.flush()
    }

    pub fn into_logger(self) -> L {
        self.state.into_inner().logger
    }

    fn dispatch(&self, event: &CallEvent<'_>) -> Result<(), TraceError> {
        // Re-entrant events come from our own logger or filter; skip them.
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return Ok(());
        };
        match event.kind() {
            EventKind::Call => state.handle_call(event.frame()),
            EventKind::Return => state.handle_return(event.frame(), event.arg()),
            EventKind::NativeCall | EventKind::NativeReturn => Ok(()),
        }
    }

    fn report(&self, error: &TraceError) {
        tracing::error!(error = %error, "failed collecting call record");
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.stats.internal_errors += 1;
        }
    }
}

impl<L: RecordLogger> TracerState<L> {
    fn handle_call(&mut self, frame: &Rc<Frame>) -> Result<(), TraceError> {
        let code = frame.code();
        if self.ignored.contains(&code.id()) {
            return Ok(());
        }
        if let Some(filter) = &self.filter {
            if !filter.should_trace(code) {
                return Ok(());
            }
        }
        let Some(function) = self.resolver.resolve(frame) else {
            return Ok(());
        };
        let identity = self.registry.identity_of(&function);

        let opens = identity.marked && !self.recording && self.sample_admits();
        if !self.recording && !opens {
            if identity.marked {
                self.window_candidates += 1;
            }
            return Ok(());
        }
        if self.pending.contains_key(&frame.id()) {
            // A resumed generator re-enters a frame we already hold.
            return Ok(());
        }

        let mut args = IndexMap::new();
        for name in code.declared_params() {
            if let Some(value) = frame.local(name) {
                args.insert(name.to_string(), Payload::snapshot(&value)?);
            }
        }

        if opens {
            self.window_candidates += 1;
            self.recording = true;
            tracing::debug!(function = %identity.funcname(), "recording window opened");
        }
        self.pending.insert(frame.id(), CallRecord::new(identity, args));
        Ok(())
    }

    fn handle_return(&mut self, frame: &Rc<Frame>, value: Option<&Value>) -> Result<(), TraceError> {
        let Some(record) = self.pending.remove(&frame.id()) else {
            return Ok(());
        };
        if self.pending.is_empty() && self.recording {
            self.recording = false;
            tracing::debug!("recording window closed");
        }

        match frame.exit_kind() {
            ExitKind::Normal => {
                let returned = match value {
                    Some(v) => Payload::snapshot(v)?,
                    None => Payload::None,
                };
                self.logger.log(record.with_return(returned));
                self.stats.records_emitted += 1;
            }
            ExitKind::Suspend => self.stats.dropped_suspended += 1,
            ExitKind::Exceptional => self.stats.dropped_exceptional += 1,
        }
        Ok(())
    }

    fn sample_admits(&self) -> bool {
        match self.sample_rate {
            Some(n) => self.window_candidates % u64::from(n) == 0,
            None => true,
        }
    }
}

impl<L: RecordLogger> CallHook for CallTracer<L> {
    fn on_event(&self, event: &CallEvent<'_>) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(event))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.report(&error),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.report(&TraceError::Internal(message));
            }
        }
    }
}
