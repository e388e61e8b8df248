//! Scripted network for tests and offline simulation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use swplug_core::error::SwplugError;
use swplug_core::request::{Request, Response};
use swplug_core::scope::Network;

use crate::lock;

/// Serves fixed responses by exact URL; unknown URLs get `404`.
///
/// While offline every fetch fails, like a browser with no connection.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`.
    pub fn route(&self, url: impl Into<String>, response: Response) {
        lock(&self.routes).insert(url.into(), response);
    }

    pub fn with_route(self, url: impl Into<String>, response: Response) -> Self {
        self.route(url, response);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// URLs requested so far, including failed attempts.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        lock(&self.calls).iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        lock(&self.calls).push(request.url.clone());

        if self.is_offline() {
            debug!(url = %request.url, "Offline; failing fetch");
            return Err(SwplugError::Network(format!("offline: {}", request.url)).into());
        }

        let response = lock(&self.routes)
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, "Not Found"));
        Ok(response.with_url(request.url.clone()))
    }
}
