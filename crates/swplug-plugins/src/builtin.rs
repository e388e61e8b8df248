//! Plugins the engine registers on its own, ahead of user plugins.

use http::Method;

use swplug_core::protocol::{ControlMessage, PLUGGABLE_SW_GET_VERSION};
use swplug_core::request::Response;
use swplug_core::scope::{ClientQuery, Clients};
use swplug_core::urls;

use crate::api::Plugin;
use crate::options::WorkerOptions;

pub const PING_PLUGIN: &str = "swplug:ping";
pub const VERSION_PLUGIN: &str = "swplug:version";

/// Answers `GET <path>` with `204 No Content` before any other plugin runs.
pub fn ping_plugin(path: impl Into<String>) -> Plugin {
    let path = path.into();
    Plugin::new(PING_PLUGIN)
        .with_order(i32::MIN)
        .on_fetch(move |event, ctx| {
            let hit = event.request.method == Method::GET
                && urls::path_of(&event.request.url, ctx.origin()).as_deref() == Some(path.as_str());
            async move { Ok(hit.then(Response::no_content)) }
        })
}

/// Replies to `PLUGGABLE_SW_GET_VERSION` with the configured version.
///
/// The reply goes to the asking client, or to every window when the
/// message carries no source.
pub fn version_plugin(version: impl Into<String>) -> Plugin {
    let version = version.into();
    Plugin::new(VERSION_PLUGIN).on_message(move |event, ctx| {
        if event.message_type() != Some(PLUGGABLE_SW_GET_VERSION) {
            return Ok(());
        }
        let reply = serde_json::to_value(ControlMessage::Version {
            version: version.clone(),
        })?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            ctx.logger.warn("No async runtime; version request dropped");
            return Ok(());
        };

        let clients = ctx.scope().clients();
        let logger = ctx.logger.clone();
        let source = event.source.clone();
        runtime.spawn(async move {
            if let Err(e) = send_reply(clients.as_ref(), source.as_deref(), reply).await {
                logger.warn(&format!("Failed to send version reply: {e}"));
            }
        });
        Ok(())
    })
}

async fn send_reply(
    clients: &dyn Clients,
    source: Option<&str>,
    reply: serde_json::Value,
) -> anyhow::Result<()> {
    if let Some(id) = source {
        return clients.post_message(id, reply).await;
    }
    for client in clients.match_all(ClientQuery::windows(false)).await? {
        clients.post_message(&client.id, reply.clone()).await?;
    }
    Ok(())
}

/// Built-ins enabled by `options`, in registration order.
pub fn builtin_plugins(options: &WorkerOptions) -> Vec<Plugin> {
    let mut plugins = Vec::new();
    if let Some(path) = options.ping_path.as_deref().filter(|p| !p.is_empty()) {
        plugins.push(ping_plugin(path));
    }
    if let Some(version) = &options.version {
        plugins.push(version_plugin(version.clone()));
    }
    plugins
}
