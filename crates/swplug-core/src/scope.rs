//! Host contract: the worker global scope and the collaborators it exposes.
//!
//! The engine never talks to the platform directly. Everything it (or a
//! plugin) needs from the outside world goes through these traits, so a
//! browser binding, the in-memory test host, and the CLI simulator are
//! interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::event::{EventKind, NotificationPayload, WorkerEvent};
use crate::request::{Request, Response};

/// What a listener hands back to the host for one event occurrence.
pub enum ListenerResult {
    /// The event was fully handled synchronously.
    Done,
    /// Keep the worker alive until the future settles (`waitUntil`).
    WaitUntil(BoxFuture<'static, ()>),
    /// Answer a fetch with the future's response (`respondWith`).
    RespondWith(BoxFuture<'static, Response>),
    /// The fetch is not intercepted; the host performs its default fetch.
    Passthrough,
}

impl std::fmt::Debug for ListenerResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerResult::Done => f.write_str("Done"),
            ListenerResult::WaitUntil(_) => f.write_str("WaitUntil(..)"),
            ListenerResult::RespondWith(_) => f.write_str("RespondWith(..)"),
            ListenerResult::Passthrough => f.write_str("Passthrough"),
        }
    }
}

/// A registered event listener.
pub type EventListener = Arc<dyn Fn(WorkerEvent) -> ListenerResult + Send + Sync>;

/// The real network, as seen from inside the worker.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response>;
}

/// One named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up a stored response by URL only (ignores method, mode, vary).
    async fn match_url(&self, url: &str) -> anyhow::Result<Option<Response>>;

    /// Store `response` under the request's URL, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> anyhow::Result<()>;

    /// Returns `true` if an entry was removed.
    async fn delete(&self, url: &str) -> anyhow::Result<bool>;

    /// URLs of all stored entries.
    async fn keys(&self) -> anyhow::Result<Vec<String>>;

    /// Look up a stored response for a request. Only `GET` requests match.
    async fn match_request(&self, request: &Request) -> anyhow::Result<Option<Response>> {
        if request.method != http::Method::GET {
            return Ok(None);
        }
        self.match_url(&request.url).await
    }
}

/// The origin's cache storage (`caches`).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (creating if needed) the cache called `name`.
    async fn open(&self, name: &str) -> anyhow::Result<Arc<dyn Cache>>;

    async fn delete(&self, name: &str) -> anyhow::Result<bool>;

    async fn keys(&self) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
}

/// A page or worker the service worker can talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
    pub client_type: ClientType,
    /// Whether this worker currently controls the client.
    pub controlled: bool,
}

/// Filter for [`Clients::match_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientQuery {
    pub client_type: Option<ClientType>,
    pub include_uncontrolled: bool,
}

impl ClientQuery {
    pub fn windows(include_uncontrolled: bool) -> Self {
        Self {
            client_type: Some(ClientType::Window),
            include_uncontrolled,
        }
    }
}

/// The worker's view of open clients (`self.clients`).
#[async_trait]
pub trait Clients: Send + Sync {
    async fn match_all(&self, query: ClientQuery) -> anyhow::Result<Vec<ClientInfo>>;

    /// Take control of every uncontrolled client in scope.
    async fn claim(&self) -> anyhow::Result<()>;

    async fn post_message(&self, client_id: &str, message: serde_json::Value) -> anyhow::Result<()>;

    async fn navigate(&self, client_id: &str, url: &str) -> anyhow::Result<()>;
}

/// Notification display (`registration.showNotification`).
#[async_trait]
pub trait Notifications: Send + Sync {
    async fn show(&self, notification: &NotificationPayload) -> anyhow::Result<()>;
}

/// The worker global scope.
#[async_trait]
pub trait ServiceWorkerScope: Send + Sync {
    /// Origin URL used to resolve relative URLs, e.g. `https://app.example`.
    fn origin(&self) -> &str;

    fn add_event_listener(&self, kind: EventKind, listener: EventListener);

    fn network(&self) -> Arc<dyn Network>;

    fn caches(&self) -> Arc<dyn CacheStorage>;

    fn clients(&self) -> Arc<dyn Clients>;

    fn notifications(&self) -> Arc<dyn Notifications>;

    /// Promote a waiting worker to active immediately.
    async fn skip_waiting(&self) -> anyhow::Result<()>;
}
