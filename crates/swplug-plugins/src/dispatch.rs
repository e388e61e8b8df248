//! Per-event dispatch strategies.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use swplug_core::event::{
    BackgroundFetchEvent, EventKind, ExtendableEvent, FetchEvent, MessageEvent,
    NotificationPayload, PeriodicSyncEvent, PushEvent, SyncEvent, WorkerEvent,
};
use swplug_core::request::{Request, Response};
use swplug_core::scope::{EventListener, ListenerResult};

use crate::api::{LifecycleHandler, PushOutcome};
use crate::context::{PluginContext, engine_fetch, in_engine_fetch};
use crate::errors::{DispatchError, ErrorKind, ErrorReporter, panic_message};
use crate::registry::{HandlerTable, Registered};

/// Run one handler call, turning both returned errors and panics (in the
/// synchronous call or while polling) into a [`DispatchError`].
async fn guarded<T, F>(plugin: &str, call: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> BoxFuture<'static, anyhow::Result<T>>,
{
    let panicked = |payload: Box<dyn std::any::Any + Send>| DispatchError::Panic {
        plugin: plugin.to_string(),
        message: panic_message(payload.as_ref()),
    };

    let future = catch_unwind(AssertUnwindSafe(call)).map_err(panicked)?;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(DispatchError::Plugin {
            plugin: plugin.to_string(),
            source,
        }),
        Err(payload) => Err(panicked(payload)),
    }
}

/// Parse a push payload the way the platform default would: a JSON object
/// with a string `title`, or failing that the raw text as the title.
pub fn default_notification(event: &PushEvent) -> Option<NotificationPayload> {
    let text = event.text()?;
    match event.json() {
        Some(Ok(serde_json::Value::Object(map))) => {
            let title = map.get("title")?.as_str()?.to_string();
            let value = serde_json::Value::Object(map);
            Some(
                serde_json::from_value(value)
                    .unwrap_or_else(|_| NotificationPayload::new(title)),
            )
        }
        Some(Ok(serde_json::Value::String(title))) if !title.is_empty() => {
            Some(NotificationPayload::new(title))
        }
        Some(Ok(_)) => None,
        _ if text.trim().is_empty() => None,
        _ => Some(NotificationPayload::new(text)),
    }
}

/// Runs the merged handler lists against event occurrences.
pub struct Dispatcher {
    table: HandlerTable,
    context: Arc<PluginContext>,
    reporter: ErrorReporter,
}

impl Dispatcher {
    pub fn new(table: HandlerTable, context: Arc<PluginContext>, reporter: ErrorReporter) -> Self {
        Self {
            table,
            context,
            reporter,
        }
    }

    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    pub fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    /// Invoke every handler concurrently and wait for all of them.
    ///
    /// Handlers are called in merge order; each failure is reported as its
    /// handler settles and never affects the siblings.
    async fn run_all<E>(
        &self,
        list: &[Registered<LifecycleHandler<E>>],
        event: Arc<E>,
        worker_event: &WorkerEvent,
    ) where
        E: Send + Sync + 'static,
    {
        if list.is_empty() {
            return;
        }
        let kind = ErrorKind::for_event(worker_event.kind());
        debug!(event = %worker_event.kind(), handlers = list.len(), "Dispatching to all handlers");

        let runs = list.iter().map(|r| {
            let event = Arc::clone(&event);
            let ctx = Arc::clone(&self.context);
            async move {
                if let Err(e) = guarded(&r.plugin, || (r.handler)(event, ctx)).await {
                    self.reporter.report(&e, worker_event, kind);
                }
            }
        });
        join_all(runs).await;
    }

    pub async fn install(&self, event: Arc<ExtendableEvent>) {
        let worker_event = WorkerEvent::Install(Arc::clone(&event));
        self.run_all(&self.table.install, event, &worker_event).await;
    }

    pub async fn activate(&self, event: Arc<ExtendableEvent>) {
        let worker_event = WorkerEvent::Activate(Arc::clone(&event));
        self.run_all(&self.table.activate, event, &worker_event).await;
    }

    pub async fn sync(&self, event: Arc<SyncEvent>) {
        let worker_event = WorkerEvent::Sync(Arc::clone(&event));
        self.run_all(&self.table.sync, event, &worker_event).await;
    }

    pub async fn periodic_sync(&self, event: Arc<PeriodicSyncEvent>) {
        let worker_event = WorkerEvent::PeriodicSync(Arc::clone(&event));
        self.run_all(&self.table.periodic_sync, event, &worker_event).await;
    }

    pub async fn background_fetch(&self, event: Arc<BackgroundFetchEvent>) {
        let worker_event = WorkerEvent::BackgroundFetch(Arc::clone(&event));
        let list = self.table.background_fetch(event.kind);
        self.run_all(list, event, &worker_event).await;
    }

    /// First response wins; otherwise fall back to the network.
    ///
    /// Always resolves to a response. A failed fallback yields 503.
    pub async fn fetch(&self, event: Arc<FetchEvent>) -> Response {
        let worker_event = WorkerEvent::Fetch(Arc::clone(&event));

        for r in &self.table.fetch {
            let ev = Arc::clone(&event);
            let ctx = Arc::clone(&self.context);
            match guarded(&r.plugin, || (r.handler)(ev, ctx)).await {
                Ok(Some(response)) => {
                    debug!(plugin = %r.plugin, url = %event.request.url, status = %response.status, "Fetch handled");
                    return response;
                }
                Ok(None) => {}
                Err(e) => self.reporter.report(&e, &worker_event, ErrorKind::FetchError),
            }
        }

        self.network_fallback(&event.request, &worker_event).await
    }

    async fn network_fallback(&self, request: &Request, worker_event: &WorkerEvent) -> Response {
        match engine_fetch(self.context.scope().network().fetch(request)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network fallback failed");
                self.reporter.report(&DispatchError::Network(e), worker_event, ErrorKind::FetchError);
                Response::service_unavailable()
            }
        }
    }

    /// Call every message handler in order, synchronously.
    pub fn message(&self, event: Arc<MessageEvent>) {
        let worker_event = WorkerEvent::Message(Arc::clone(&event));

        for r in &self.table.message {
            let error = match catch_unwind(AssertUnwindSafe(|| (r.handler)(event.as_ref(), self.context.as_ref()))) {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => DispatchError::Plugin {
                    plugin: r.plugin.clone(),
                    source,
                },
                Err(payload) => DispatchError::Panic {
                    plugin: r.plugin.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };
            self.reporter
                .report(&error, &worker_event, ErrorKind::MessageErrorHandler);
        }
    }

    /// Collect push outcomes in order, then show notifications once.
    pub async fn push(&self, event: Arc<PushEvent>) {
        let worker_event = WorkerEvent::Push(Arc::clone(&event));
        let mut payloads = Vec::new();
        let mut suppressed = 0usize;

        for r in &self.table.push {
            let ev = Arc::clone(&event);
            let ctx = Arc::clone(&self.context);
            match guarded(&r.plugin, || (r.handler)(ev, ctx)).await {
                Ok(PushOutcome::Show(payload)) => payloads.push(payload),
                Ok(PushOutcome::Suppress) => suppressed += 1,
                Ok(PushOutcome::Nothing) => {}
                Err(e) => self.reporter.report(&e, &worker_event, ErrorKind::PushError),
            }
        }

        if !payloads.is_empty() {
            for payload in &payloads {
                self.show_notification(payload, &worker_event).await;
            }
            return;
        }

        if suppressed > 0 && suppressed == self.table.push.len() {
            debug!("Default push notification suppressed");
            return;
        }

        if let Some(payload) = default_notification(&event) {
            self.show_notification(&payload, &worker_event).await;
        }
    }

    async fn show_notification(&self, payload: &NotificationPayload, worker_event: &WorkerEvent) {
        if let Err(e) = self.context.scope().notifications().show(payload).await {
            self.reporter.report(
                &DispatchError::Notification(e),
                worker_event,
                ErrorKind::PushError,
            );
        }
    }

    /// Forward one global platform error to the error callback.
    pub fn global_error(&self, event: &WorkerEvent) {
        let error = match event {
            WorkerEvent::Error(e) => DispatchError::Platform {
                message: e.message.clone(),
                value: e.error.clone(),
            },
            WorkerEvent::MessageError(e) => DispatchError::Platform {
                message: "message could not be deserialized".to_string(),
                value: e.data.clone(),
            },
            WorkerEvent::Rejection(e) => DispatchError::Platform {
                message: match &e.reason {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                value: e.reason.clone(),
            },
            _ => return,
        };
        self.reporter
            .report(&error, event, ErrorKind::for_event(event.kind()));
    }

    /// Translate one host event into a listener result.
    pub fn handle(self: &Arc<Self>, event: WorkerEvent) -> ListenerResult {
        let this = Arc::clone(self);
        match event {
            WorkerEvent::Install(ev) => ListenerResult::WaitUntil(async move { this.install(ev).await }.boxed()),
            WorkerEvent::Activate(ev) => ListenerResult::WaitUntil(async move { this.activate(ev).await }.boxed()),
            WorkerEvent::Sync(ev) => ListenerResult::WaitUntil(async move { this.sync(ev).await }.boxed()),
            WorkerEvent::PeriodicSync(ev) => {
                ListenerResult::WaitUntil(async move { this.periodic_sync(ev).await }.boxed())
            }
            WorkerEvent::BackgroundFetch(ev) => {
                ListenerResult::WaitUntil(async move { this.background_fetch(ev).await }.boxed())
            }
            WorkerEvent::Push(ev) => ListenerResult::WaitUntil(async move { this.push(ev).await }.boxed()),
            WorkerEvent::Fetch(ev) => {
                if in_engine_fetch() {
                    debug!(url = %ev.request.url, "Engine-initiated fetch; not intercepting");
                    return ListenerResult::Passthrough;
                }
                ListenerResult::RespondWith(async move { this.fetch(ev).await }.boxed())
            }
            WorkerEvent::Message(ev) => {
                this.message(ev);
                ListenerResult::Done
            }
            global @ (WorkerEvent::Error(_) | WorkerEvent::MessageError(_) | WorkerEvent::Rejection(_)) => {
                this.global_error(&global);
                ListenerResult::Done
            }
        }
    }

    /// Listener to register with the host for `kind`.
    pub fn listener(self: &Arc<Self>, kind: EventKind) -> EventListener {
        let this = Arc::clone(self);
        Arc::new(move |event: WorkerEvent| {
            if event.kind() != kind {
                warn!(expected = %kind, got = %event.kind(), "Event delivered to the wrong listener");
                return ListenerResult::Done;
            }
            this.handle(event)
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(&str, usize)> = EventKind::ALL
            .iter()
            .map(|k| (k.as_str(), self.table.count(*k)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &counts)
            .field("context", &self.context)
            .finish()
    }
}
