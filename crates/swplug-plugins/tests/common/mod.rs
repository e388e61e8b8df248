#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use swplug_core::scope::ServiceWorkerScope;
use swplug_host::MemoryScope;
use swplug_plugins::{
    Dispatcher, ErrorKind, InitGuard, Logger, Plugin, WorkerOptions, initialize_with,
};

pub const ORIGIN: &str = "https://app.test";

/// Logger that keeps every line as `(level, message)`.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogger {
    pub fn lines(&self, level: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn push(&self, level: &'static str, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

impl Logger for RecordingLogger {
    fn trace(&self, m: &str) {
        self.push("trace", m);
    }
    fn debug(&self, m: &str) {
        self.push("debug", m);
    }
    fn info(&self, m: &str) {
        self.push("info", m);
    }
    fn warn(&self, m: &str) {
        self.push("warn", m);
    }
    fn error(&self, m: &str) {
        self.push("error", m);
    }
}

/// Error callback invocations as `(kind, plugin, message)`.
pub type ErrorLog = Arc<Mutex<Vec<(ErrorKind, Option<String>, String)>>>;

/// Shared, ordered record of which handler ran.
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record(trace: &Trace, entry: impl Into<String>) {
    trace.lock().unwrap().push(entry.into());
}

pub fn entries(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}

pub struct Harness {
    pub scope: Arc<MemoryScope>,
    pub dispatcher: Arc<Dispatcher>,
    pub logger: Arc<RecordingLogger>,
    pub errors: ErrorLog,
}

/// Initialize `plugins` on a fresh in-memory scope with a capturing error callback.
pub fn start(plugins: Vec<Plugin>) -> Harness {
    start_on(Arc::new(MemoryScope::new(ORIGIN)), plugins, WorkerOptions::new())
}

pub fn start_on(scope: Arc<MemoryScope>, plugins: Vec<Plugin>, options: WorkerOptions) -> Harness {
    let logger = Arc::new(RecordingLogger::default());
    let errors: ErrorLog = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let options = options
        .with_logger(logger.clone())
        .with_on_error(move |error, _event, kind| {
            sink.lock()
                .unwrap()
                .push((kind, error.plugin().map(str::to_string), error.to_string()));
            Ok(())
        });

    let guard = InitGuard::new();
    let dyn_scope: Arc<dyn ServiceWorkerScope> = scope.clone();
    let dispatcher = initialize_with(&guard, dyn_scope, plugins, options)
        .expect("fresh guard initializes");

    Harness {
        scope,
        dispatcher,
        logger,
        errors,
    }
}

pub fn error_kinds(errors: &ErrorLog) -> Vec<ErrorKind> {
    errors.lock().unwrap().iter().map(|(k, _, _)| *k).collect()
}
