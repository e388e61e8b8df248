//! The single idempotent entry point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use swplug_core::event::EventKind;
use swplug_core::scope::ServiceWorkerScope;

use crate::api::Plugin;
use crate::builtin;
use crate::context::{Logger, PluginContext, TracingLogger};
use crate::dispatch::Dispatcher;
use crate::errors::ErrorReporter;
use crate::options::WorkerOptions;
use crate::registry::HandlerTable;

/// One-shot latch guarding listener registration.
#[derive(Debug, Default)]
pub struct InitGuard {
    initialized: AtomicBool,
}

impl InitGuard {
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// `true` exactly once: for the caller that flips the latch.
    fn acquire(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Re-arm the latch. Only meant for test isolation.
    pub fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }
}

static GLOBAL_GUARD: InitGuard = InitGuard::new();

/// Compose `plugins` and register listeners on `scope`, once per process.
///
/// Returns the dispatcher on the first call and `None` on every later
/// call, which leaves the already registered listeners untouched.
pub fn initialize(
    scope: Arc<dyn ServiceWorkerScope>,
    plugins: Vec<Plugin>,
    options: WorkerOptions,
) -> Option<Arc<Dispatcher>> {
    initialize_with(&GLOBAL_GUARD, scope, plugins, options)
}

/// [`initialize`] against an explicit guard.
pub fn initialize_with(
    guard: &InitGuard,
    scope: Arc<dyn ServiceWorkerScope>,
    plugins: Vec<Plugin>,
    options: WorkerOptions,
) -> Option<Arc<Dispatcher>> {
    if !guard.acquire() {
        debug!("Service worker already initialized; ignoring");
        return None;
    }

    let logger: Arc<dyn Logger> = options
        .logger
        .clone()
        .unwrap_or_else(|| Arc::new(TracingLogger));

    let mut all = builtin::builtin_plugins(&options);
    all.extend(plugins);

    let table = HandlerTable::build(&all, logger.as_ref());
    let context = Arc::new(PluginContext::new(Arc::clone(&scope), &options, Arc::clone(&logger)));
    let reporter = ErrorReporter::new(logger, options.on_error.clone());
    let dispatcher = Arc::new(Dispatcher::new(table, context, reporter));

    for kind in EventKind::GLOBAL {
        scope.add_event_listener(kind, dispatcher.listener(kind));
    }
    let mut registered = EventKind::GLOBAL.len();
    // Push is always registered: with no handlers the payload still
    // becomes a default notification.
    for kind in EventKind::ALL.into_iter().filter(|k| !k.is_global()) {
        if kind == EventKind::Push || dispatcher.table().count(kind) > 0 {
            scope.add_event_listener(kind, dispatcher.listener(kind));
            registered += 1;
        }
    }

    info!(
        plugins = all.len(),
        listeners = registered,
        origin = %scope.origin(),
        "Service worker initialized"
    );
    Some(dispatcher)
}

/// Re-arm the process-wide guard so [`initialize`] runs again.
#[doc(hidden)]
pub fn reset_for_tests() {
    GLOBAL_GUARD.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_acquires_once() {
        let guard = InitGuard::new();
        assert!(!guard.is_initialized());
        assert!(guard.acquire());
        assert!(!guard.acquire());
        assert!(guard.is_initialized());
    }

    #[test]
    fn test_guard_reset_rearms() {
        let guard = InitGuard::new();
        assert!(guard.acquire());
        guard.reset();
        assert!(!guard.is_initialized());
        assert!(guard.acquire());
    }
}
