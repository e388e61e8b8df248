//! Read-only context handed to every plugin handler.

use std::collections::HashMap;
use std::sync::Arc;

use swplug_core::protocol::typed_message;
use swplug_core::request::{Request, Response};
use swplug_core::scope::{ClientQuery, ServiceWorkerScope};
use swplug_core::urls;

use crate::options::WorkerOptions;

/// Logging capability exposed to plugins.
pub trait Logger: Send + Sync {
    fn trace(&self, message: &str);
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default logger: forwards to `tracing` under the `swplug` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn trace(&self, message: &str) {
        tracing::trace!(target: "swplug", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "swplug", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "swplug", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "swplug", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "swplug", "{message}");
    }
}

tokio::task_local! {
    static ENGINE_FETCH: ();
}

/// Whether the current task is polling a network fetch issued by the
/// engine itself. The fetch listener does not intercept such requests.
pub fn in_engine_fetch() -> bool {
    ENGINE_FETCH.try_with(|_| ()).is_ok()
}

/// Run `fetch` marked as engine-initiated. The mark is only visible while
/// this future is polled, so concurrent page fetches are unaffected.
pub(crate) async fn engine_fetch<F: Future>(fetch: F) -> F::Output {
    ENGINE_FETCH.scope((), fetch).await
}

/// Capabilities and configuration shared by all handlers of one
/// initialization. Built once; never mutated afterwards.
pub struct PluginContext {
    pub logger: Arc<dyn Logger>,
    pub version: Option<String>,
    /// Base path the app is served under.
    pub base: Option<String>,
    /// Plugin-declared fields, passed through verbatim from the options.
    pub metadata: HashMap<String, serde_json::Value>,
    scope: Arc<dyn ServiceWorkerScope>,
}

impl PluginContext {
    pub fn new(scope: Arc<dyn ServiceWorkerScope>, options: &WorkerOptions, logger: Arc<dyn Logger>) -> Self {
        Self {
            logger,
            version: options.version.clone(),
            base: options.base.clone(),
            metadata: options.metadata.clone(),
            scope,
        }
    }

    pub fn scope(&self) -> &Arc<dyn ServiceWorkerScope> {
        &self.scope
    }

    pub fn origin(&self) -> &str {
        self.scope.origin()
    }

    /// A plugin-declared field.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Fetch from the network without being intercepted by this worker.
    pub async fn fetch_passthrough(&self, request: &Request) -> anyhow::Result<Response> {
        engine_fetch(self.scope.network().fetch(request)).await
    }

    pub fn normalize_url(&self, url: &str) -> swplug_core::error::Result<String> {
        urls::normalize_url(url, self.origin())
    }

    /// Resolve asset paths against the configured base path.
    pub fn resolve_asset_urls(&self, assets: &[String]) -> swplug_core::error::Result<Vec<String>> {
        urls::resolve_asset_urls(assets, self.base.as_deref(), self.origin())
    }

    /// Post `{ type: message_type, ..data }` to every window client.
    pub async fn notify_clients(
        &self,
        message_type: &str,
        data: Option<&serde_json::Value>,
        include_uncontrolled: bool,
    ) -> anyhow::Result<()> {
        let clients = self.scope.clients();
        let list = clients
            .match_all(ClientQuery::windows(include_uncontrolled))
            .await?;
        let payload = typed_message(message_type, data);
        for client in list {
            clients.post_message(&client.id, payload.clone()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("origin", &self.origin())
            .field("version", &self.version)
            .field("base", &self.base)
            .field("metadata", &self.metadata)
            .finish()
    }
}
