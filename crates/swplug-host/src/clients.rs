//! In-memory client list with a message and navigation log.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use swplug_core::error::SwplugError;
use swplug_core::scope::{ClientInfo, ClientQuery, ClientType, Clients};

use crate::lock;

#[derive(Debug, Default)]
pub struct MemoryClients {
    clients: Mutex<Vec<ClientInfo>>,
    messages: Mutex<Vec<(String, serde_json::Value)>>,
    navigations: Mutex<Vec<(String, String)>>,
    claims: AtomicUsize,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a window client at `url` and return its id.
    pub fn open_window(&self, url: impl Into<String>, controlled: bool) -> String {
        self.open(url, ClientType::Window, controlled)
    }

    pub fn open(&self, url: impl Into<String>, client_type: ClientType, controlled: bool) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        lock(&self.clients).push(ClientInfo {
            id: id.clone(),
            url: url.into(),
            client_type,
            controlled,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<ClientInfo> {
        lock(&self.clients).iter().find(|c| c.id == id).cloned()
    }

    /// Every posted message as `(client id, message)`, in send order.
    pub fn messages(&self) -> Vec<(String, serde_json::Value)> {
        lock(&self.messages).clone()
    }

    /// Messages posted to one client.
    pub fn messages_for(&self, id: &str) -> Vec<serde_json::Value> {
        lock(&self.messages)
            .iter()
            .filter(|(to, _)| to == id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Every navigation as `(client id, url)`.
    pub fn navigations(&self) -> Vec<(String, String)> {
        lock(&self.navigations).clone()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clients for MemoryClients {
    async fn match_all(&self, query: ClientQuery) -> anyhow::Result<Vec<ClientInfo>> {
        Ok(lock(&self.clients)
            .iter()
            .filter(|c| query.client_type.is_none_or(|t| t == c.client_type))
            .filter(|c| query.include_uncontrolled || c.controlled)
            .cloned()
            .collect())
    }

    async fn claim(&self) -> anyhow::Result<()> {
        let mut clients = lock(&self.clients);
        for client in clients.iter_mut() {
            client.controlled = true;
        }
        self.claims.fetch_add(1, Ordering::SeqCst);
        debug!(clients = clients.len(), "Clients claimed");
        Ok(())
    }

    async fn post_message(&self, client_id: &str, message: serde_json::Value) -> anyhow::Result<()> {
        if self.get(client_id).is_none() {
            return Err(SwplugError::Client(format!("unknown client {client_id}")).into());
        }
        lock(&self.messages).push((client_id.to_string(), message));
        Ok(())
    }

    async fn navigate(&self, client_id: &str, url: &str) -> anyhow::Result<()> {
        let mut clients = lock(&self.clients);
        let Some(client) = clients.iter_mut().find(|c| c.id == client_id) else {
            return Err(SwplugError::Client(format!("unknown client {client_id}")).into());
        };
        client.url = url.to_string();
        lock(&self.navigations).push((client_id.to_string(), url.to_string()));
        Ok(())
    }
}
