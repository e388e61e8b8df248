//! In-memory worker global scope.
//!
//! Besides implementing [`ServiceWorkerScope`], `MemoryScope` plays the
//! browser's part: it delivers events to the registered listeners and
//! honors what they hand back (`waitUntil`, `respondWith`, passthrough).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tracing::debug;

use swplug_core::event::{
    BackgroundFetchEvent, BackgroundFetchRegistration, ErrorEvent, EventKind, ExtendableEvent,
    FetchEvent, MessageErrorEvent, MessageEvent, PeriodicSyncEvent, PushEvent, RejectionEvent,
    SyncEvent, WorkerEvent,
};
use swplug_core::request::{Request, Response};
use swplug_core::scope::{
    CacheStorage, Clients, EventListener, ListenerResult, Network, Notifications,
    ServiceWorkerScope,
};

use crate::cache::MemoryCacheStorage;
use crate::clients::MemoryClients;
use crate::lock;
use crate::network::MemoryNetwork;
use crate::notifications::RecordingNotifications;

pub struct MemoryScope {
    origin: String,
    listeners: Mutex<HashMap<EventKind, Vec<EventListener>>>,
    registrations: Mutex<Vec<EventKind>>,
    network: Arc<dyn Network>,
    caches: Arc<MemoryCacheStorage>,
    clients: Arc<MemoryClients>,
    notifications: Arc<RecordingNotifications>,
    skip_waiting_calls: AtomicUsize,
}

impl MemoryScope {
    /// A scope for `origin` backed by an empty [`MemoryNetwork`].
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_network(origin, Arc::new(MemoryNetwork::new()))
    }

    pub fn with_network(origin: impl Into<String>, network: Arc<dyn Network>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            listeners: Mutex::new(HashMap::new()),
            registrations: Mutex::new(Vec::new()),
            network,
            caches: Arc::new(MemoryCacheStorage::new()),
            clients: Arc::new(MemoryClients::new()),
            notifications: Arc::new(RecordingNotifications::new()),
            skip_waiting_calls: AtomicUsize::new(0),
        }
    }

    pub fn cache_storage(&self) -> &Arc<MemoryCacheStorage> {
        &self.caches
    }

    pub fn client_list(&self) -> &Arc<MemoryClients> {
        &self.clients
    }

    pub fn notification_log(&self) -> &Arc<RecordingNotifications> {
        &self.notifications
    }

    /// Total `add_event_listener` calls.
    pub fn listener_count(&self) -> usize {
        lock(&self.registrations).len()
    }

    /// Kinds passed to `add_event_listener`, in call order.
    pub fn registrations(&self) -> Vec<EventKind> {
        lock(&self.registrations).clone()
    }

    pub fn has_listener(&self, kind: EventKind) -> bool {
        lock(&self.listeners).get(&kind).is_some_and(|l| !l.is_empty())
    }

    pub fn skip_waiting_count(&self) -> usize {
        self.skip_waiting_calls.load(Ordering::SeqCst)
    }

    /// Absolute URL for `path` on this origin.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// Call every listener for the event's kind, in registration order.
    pub fn emit(&self, event: WorkerEvent) -> Vec<ListenerResult> {
        let listeners = lock(&self.listeners)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        listeners.iter().map(|l| l(event.clone())).collect()
    }

    /// Deliver a lifecycle-extending event and wait for every `waitUntil`.
    pub async fn extend(&self, event: WorkerEvent) {
        let kind = event.kind();
        let pending: Vec<_> = self
            .emit(event)
            .into_iter()
            .filter_map(|r| match r {
                ListenerResult::WaitUntil(fut) => Some(fut),
                _ => None,
            })
            .collect();
        debug!(%kind, pending = pending.len(), "Waiting for lifecycle extensions");
        join_all(pending).await;
    }

    pub async fn install(&self) {
        self.extend(WorkerEvent::Install(Arc::new(ExtendableEvent::install())))
            .await;
    }

    pub async fn activate(&self) {
        self.extend(WorkerEvent::Activate(Arc::new(ExtendableEvent::activate())))
            .await;
    }

    pub async fn sync(&self, tag: impl Into<String>) {
        let event = SyncEvent {
            tag: tag.into(),
            last_chance: false,
        };
        self.extend(WorkerEvent::Sync(Arc::new(event))).await;
    }

    pub async fn periodic_sync(&self, tag: impl Into<String>) {
        let event = PeriodicSyncEvent { tag: tag.into() };
        self.extend(WorkerEvent::PeriodicSync(Arc::new(event))).await;
    }

    pub async fn push(&self, data: Option<Bytes>) {
        self.extend(WorkerEvent::Push(Arc::new(PushEvent { data })))
            .await;
    }

    pub async fn background_fetch(&self, kind: EventKind, registration: BackgroundFetchRegistration) {
        let event = BackgroundFetchEvent { kind, registration };
        self.extend(WorkerEvent::BackgroundFetch(Arc::new(event)))
            .await;
    }

    /// Deliver a fetch the way a page would issue it.
    ///
    /// The first `respondWith` answers. With no listener, or when every
    /// listener passes through, the host performs the network fetch.
    pub async fn fetch(&self, request: Request) -> anyhow::Result<Response> {
        let event = Arc::new(FetchEvent::new(request.clone()));
        for result in self.emit(WorkerEvent::Fetch(event)) {
            if let ListenerResult::RespondWith(response) = result {
                return Ok(response.await);
            }
        }
        debug!(url = %request.url, "Not intercepted; using the network");
        self.network.fetch(&request).await
    }

    pub fn message(&self, data: serde_json::Value, source: Option<&str>) {
        let event = match source {
            Some(id) => MessageEvent::from_client(data, id),
            None => MessageEvent::new(data),
        };
        self.emit(WorkerEvent::Message(Arc::new(event)));
    }

    pub fn raise_error(&self, event: ErrorEvent) {
        self.emit(WorkerEvent::Error(Arc::new(event)));
    }

    pub fn message_error(&self, data: serde_json::Value) {
        self.emit(WorkerEvent::MessageError(Arc::new(MessageErrorEvent { data })));
    }

    /// Report a promise rejection; `handled` selects `rejectionhandled`.
    pub fn reject(&self, reason: serde_json::Value, handled: bool) {
        let kind = if handled {
            EventKind::RejectionHandled
        } else {
            EventKind::UnhandledRejection
        };
        self.emit(WorkerEvent::Rejection(Arc::new(RejectionEvent { kind, reason })));
    }
}

#[async_trait]
impl ServiceWorkerScope for MemoryScope {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn add_event_listener(&self, kind: EventKind, listener: EventListener) {
        debug!(%kind, "Listener registered");
        lock(&self.listeners).entry(kind).or_default().push(listener);
        lock(&self.registrations).push(kind);
    }

    fn network(&self) -> Arc<dyn Network> {
        Arc::clone(&self.network)
    }

    fn caches(&self) -> Arc<dyn CacheStorage> {
        self.caches.clone()
    }

    fn clients(&self) -> Arc<dyn Clients> {
        self.clients.clone()
    }

    fn notifications(&self) -> Arc<dyn Notifications> {
        self.notifications.clone()
    }

    async fn skip_waiting(&self) -> anyhow::Result<()> {
        self.skip_waiting_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryScope")
            .field("origin", &self.origin)
            .field("registrations", &self.registrations())
            .finish_non_exhaustive()
    }
}
