//! Drive one worker through its lifecycle against the in-memory host.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use swplug_core::config::WorkerConfig;
use swplug_core::event::NotificationPayload;
use swplug_core::request::{Request, Response};
use swplug_core::scope::{Cache, CacheStorage, Network, ServiceWorkerScope};
use swplug_core::urls;
use swplug_host::{HttpNetwork, MemoryNetwork, MemoryScope};
use swplug_plugins::{ErrorKind, InitGuard, WorkerOptions, initialize_with};
use swplug_strategies::preset_plugins;

/// What to do after install and activate.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub origin: String,
    /// Use the real network instead of the scripted one.
    pub live: bool,
    /// Take the scripted network offline once the worker is active.
    pub offline: bool,
    /// Extra scripted responses as `(url, body)`.
    pub routes: Vec<(String, String)>,
    pub fetches: Vec<String>,
    /// Raw JSON messages, posted from an open page.
    pub messages: Vec<String>,
    pub push: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FetchOutcome {
    pub url: String,
    pub status: u16,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub plugin: Option<String>,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub listeners: Vec<String>,
    pub cached: Vec<String>,
    pub skip_waiting: usize,
    pub claims: usize,
    pub fetches: Vec<FetchOutcome>,
    pub client_messages: Vec<serde_json::Value>,
    pub notifications: Vec<NotificationPayload>,
    pub errors: Vec<ErrorRecord>,
}

impl Report {
    pub fn print(&self) {
        println!("Listeners: {}", self.listeners.join(", "));
        println!("Cached ({}):", self.cached.len());
        for url in &self.cached {
            println!("  {url}");
        }
        println!("skipWaiting calls: {}", self.skip_waiting);
        println!("Client claims: {}", self.claims);
        for fetch in &self.fetches {
            println!("GET {} -> {} ({} bytes)", fetch.url, fetch.status, fetch.bytes);
        }
        for message in &self.client_messages {
            println!("Page received: {message}");
        }
        for notification in &self.notifications {
            println!("Notification: {}", notification.title);
        }
        for error in &self.errors {
            match &error.plugin {
                Some(plugin) => println!("Error [{}] in {plugin}: {}", error.kind, error.message),
                None => println!("Error [{}]: {}", error.kind, error.message),
            }
        }
    }
}

pub async fn run(config: &WorkerConfig, script: &Script) -> anyhow::Result<Report> {
    let scripted = Arc::new(MemoryNetwork::new());
    let network: Arc<dyn Network> = if script.live {
        Arc::new(HttpNetwork::new()?)
    } else {
        let assets = urls::resolve_asset_urls(&config.assets, config.base.as_deref(), &script.origin)?;
        for url in assets {
            scripted.route(url.clone(), Response::ok(format!("scripted {url}")));
        }
        for (url, body) in &script.routes {
            scripted.route(url.clone(), Response::ok(body.clone()));
        }
        scripted.clone()
    };

    let scope = Arc::new(MemoryScope::with_network(script.origin.clone(), network));
    let page = scope.client_list().open_window(scope.url("/"), false);

    let errors: Arc<Mutex<Vec<ErrorRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let options = WorkerOptions::from_config(config).with_on_error(move |error, _event, kind| {
        let mut sink = sink.lock().map_err(|_| anyhow::anyhow!("error log poisoned"))?;
        sink.push(ErrorRecord {
            kind,
            plugin: error.plugin().map(str::to_string),
            message: error.to_string(),
        });
        Ok(())
    });

    let plugins = preset_plugins(config)?;
    info!(plugins = plugins.len(), origin = %script.origin, "Starting simulated worker");
    let dyn_scope: Arc<dyn ServiceWorkerScope> = scope.clone();
    initialize_with(&InitGuard::new(), dyn_scope, plugins, options)
        .context("worker was already initialized")?;

    scope.install().await;
    scope.activate().await;

    if script.offline && !script.live {
        debug!("Taking the scripted network offline");
        scripted.set_offline(true);
    }

    let mut report = Report {
        listeners: scope.registrations().iter().map(|k| k.to_string()).collect(),
        skip_waiting: scope.skip_waiting_count(),
        claims: scope.client_list().claim_count(),
        ..Default::default()
    };

    for target in &script.fetches {
        let url = urls::normalize_url(target, scope.origin())?;
        let response = scope.fetch(Request::get(url.clone())).await?;
        report.fetches.push(FetchOutcome {
            url,
            status: response.status.as_u16(),
            bytes: response.body.len(),
        });
    }

    for raw in &script.messages {
        let data: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("message is not JSON: {raw}"))?;
        scope.message(data, Some(&page));
    }

    if let Some(data) = &script.push {
        scope.push(Some(Bytes::from(data.clone()))).await;
    }

    // Message handlers reply from spawned tasks.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let storage = scope.caches();
    for name in storage.keys().await? {
        let cache = storage.open(&name).await?;
        report.cached.extend(cache.keys().await?);
    }
    report.skip_waiting = scope.skip_waiting_count();
    report.client_messages = scope.client_list().messages_for(&page);
    report.notifications = scope.notification_log().shown();
    report.errors = errors
        .lock()
        .map_err(|_| anyhow::anyhow!("error log poisoned"))?
        .clone();

    Ok(report)
}
