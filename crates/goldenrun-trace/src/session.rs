//! Scoped tracing sessions.
//!
//! A [`TraceSession`] installs a [`CallTracer`] on a runtime and owns it
//! until the session ends. Ending the session, by [`TraceSession::finish`]
//! or by dropping it during a panic, restores whatever hook was installed
//! before and flushes the tracer's logger exactly once.

use std::rc::Rc;

use goldenrun_core::{CallHook, RecordLogger, Runtime};

use crate::error::TraceError;
use crate::tracer::{CallTracer, TraceStats};

pub struct TraceSession<'rt, L: RecordLogger + 'static> {
    rt: &'rt mut Runtime,
    tracer: Rc<CallTracer<L>>,
    previous: Option<Rc<dyn CallHook>>,
    finished: bool,
}

impl<'rt, L: RecordLogger + 'static> TraceSession<'rt, L> {
    pub fn start(rt: &'rt mut Runtime, tracer: CallTracer<L>) -> Self {
        let tracer = Rc::new(tracer);
        let previous = rt.set_profile(Some(tracer.clone()));
        tracing::debug!(had_previous = previous.is_some(), "trace session started");
        TraceSession {
            rt,
            tracer,
            previous,
            finished: false,
        }
    }

    /// The traced runtime.
    pub fn runtime(&mut self) -> &mut Runtime {
        self.rt
    }

    pub fn tracer(&self) -> &CallTracer<L> {
        &self.tracer
    }

    pub fn stats(&self) -> TraceStats {
        self.tracer.stats()
    }

    /// Ends the session and hands back the logger.
    pub fn finish(mut self) -> Result<L, TraceError> {
        self.finished = true;
        self.stop()?;
        let tracer = Rc::clone(&self.tracer);
        drop(self);
        match Rc::try_unwrap(tracer) {
            Ok(tracer) => Ok(tracer.into_logger()),
            Err(_) => Err(TraceError::TracerStillInstalled),
        }
    }

    fn stop(&mut self) -> Result<(), TraceError> {
        self.rt.set_profile(self.previous.take());
        let stats = self.tracer.stats();
        tracing::debug!(
            records = stats.records_emitted,
            internal_errors = stats.internal_errors,
            "trace session stopped"
        );
        self.tracer
            .flush()
            .map_err(|e| TraceError::Flush(Box::new(e)))
    }
}

impl<L: RecordLogger + 'static> Drop for TraceSession<'_, L> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(error) = self.stop() {
            tracing::warn!(error = %error, "flushing call records on drop failed");
        }
    }
}

/// Runs `body` with `tracer` installed and returns its result together
/// with the flushed logger. The logger is flushed even if `body` panics.
pub fn trace_calls<L, R, F>(
    rt: &mut Runtime,
    tracer: CallTracer<L>,
    body: F,
) -> Result<(R, L), TraceError>
where
    L: RecordLogger + 'static,
    F: FnOnce(&mut Runtime) -> R,
{
    let mut session = TraceSession::start(rt, tracer);
    let result = body(session.runtime());
    let logger = session.finish()?;
    Ok((result, logger))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::panic::{self, AssertUnwindSafe};
    use std::path::PathBuf;

    use goldenrun_core::{Args, CallEvent, CallRecord, Module, Value};
    use goldenrun_storage::{InMemoryStore, StoreLogger};

    use super::*;
    use crate::registry::CaptureRegistry;

    struct Counter(Cell<usize>);

    impl CallHook for Counter {
        fn on_event(&self, _: &CallEvent<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn runtime() -> (Runtime, Value) {
        let m = Module::new("app", Some(PathBuf::from("/proj/app.py")));
        let f = m.def("double", m.code("double").with_params(["x"]), |_, frame| {
            let x = frame.local("x").and_then(|v| v.as_int()).unwrap_or(0);
            Ok(Value::Int(x * 2))
        });
        let mut rt = Runtime::new();
        rt.add_module(m);
        (rt, Value::Function(f))
    }

    fn marked() -> CaptureRegistry {
        let mut registry = CaptureRegistry::new();
        registry.mark("app", "double");
        registry
    }

    #[test]
    fn previous_hook_is_restored() {
        let (mut rt, f) = runtime();
        let counter = Rc::new(Counter(Cell::new(0)));
        rt.set_profile(Some(counter.clone()));

        let tracer = CallTracer::new(Vec::<CallRecord>::new(), marked());
        let (value, records) =
            trace_calls(&mut rt, tracer, |rt| rt.call(&f, Args::new(vec![Value::Int(4)])))
                .unwrap();
        assert_eq!(value.unwrap(), Value::Int(8));
        assert_eq!(records.len(), 1);
        // The counter saw nothing while the session was active.
        assert_eq!(counter.0.get(), 0);

        rt.call(&f, Args::new(vec![Value::Int(1)])).unwrap();
        assert_eq!(counter.0.get(), 2);
    }

    /// Hands flushed batches to a shared vector.
    struct SharedSink {
        buffer: Vec<CallRecord>,
        flushed: Rc<RefCell<Vec<Vec<CallRecord>>>>,
    }

    impl RecordLogger for SharedSink {
        type Error = std::convert::Infallible;

        fn log(&mut self, record: CallRecord) {
            self.buffer.push(record);
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushed.borrow_mut().push(std::mem::take(&mut self.buffer));
            Ok(())
        }
    }

    #[test]
    fn flush_happens_once_when_body_panics() {
        let (mut rt, f) = runtime();
        let flushed = Rc::new(RefCell::new(Vec::new()));
        let sink = SharedSink {
            buffer: Vec::new(),
            flushed: flushed.clone(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut session = TraceSession::start(&mut rt, CallTracer::new(sink, marked()));
            session
                .runtime()
                .call(&f, Args::new(vec![Value::Int(2)]))
                .unwrap();
            panic!("traced program crashed");
        }));

        assert!(outcome.is_err());
        assert!(rt.profile().is_none());
        let flushed = flushed.borrow();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].len(), 1);
        assert_eq!(flushed[0][0].return_value, Some(goldenrun_core::Payload::Int(4)));
    }

    #[test]
    fn store_logger_flushes_on_finish() {
        let (mut rt, f) = runtime();
        let tracer = CallTracer::new(StoreLogger::new(InMemoryStore::new()), marked());
        let (_, logger) =
            trace_calls(&mut rt, tracer, |rt| rt.call(&f, Args::new(vec![Value::Int(3)])))
                .unwrap();
        assert!(logger.pending().is_empty());
        assert_eq!(logger.store().len(), 1);
    }

    #[test]
    fn finish_fails_while_tracer_is_shared() {
        let (mut rt, _) = runtime();
        let session = TraceSession::start(&mut rt, CallTracer::new(Vec::<CallRecord>::new(), marked()));
        let extra = session.runtime_hook();
        assert!(matches!(session.finish(), Err(TraceError::TracerStillInstalled)));
        drop(extra);
    }

    impl<L: RecordLogger + 'static> TraceSession<'_, L> {
        fn runtime_hook(&self) -> Option<Rc<dyn CallHook>> {
            self.rt.profile()
        }
    }
}
