//! Activation policies: when a new worker takes over, and what happens to
//! the pages it takes over.

use futures::future::try_join_all;

use swplug_core::protocol::SW_MSG_SKIP_WAITING;
use swplug_core::scope::ClientQuery;
use swplug_plugins::{Plugin, PluginContext};

/// Take control of open clients on activate.
pub fn claim() -> Plugin {
    Plugin::new("claim").on_activate(|_event, ctx| async move { ctx.scope().clients().claim().await })
}

/// Activate as soon as installation finishes.
pub fn skip_waiting() -> Plugin {
    Plugin::new("skip-waiting").on_install(|_event, ctx| async move { ctx.scope().skip_waiting().await })
}

/// Activate when a client posts a message of `message_type`
/// (`SW_MSG_SKIP_WAITING` by default).
pub fn skip_waiting_on_message(message_type: Option<String>) -> Plugin {
    let message_type = message_type.unwrap_or_else(|| SW_MSG_SKIP_WAITING.to_string());
    Plugin::new("skip-waiting-on-message").on_message(move |event, ctx| {
        if event.message_type() != Some(message_type.as_str()) {
            return Ok(());
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            ctx.logger.warn("No async runtime; skip-waiting request dropped");
            return Ok(());
        };

        ctx.logger.info(&format!("{message_type} received; skipping waiting"));
        let scope = ctx.scope().clone();
        let logger = ctx.logger.clone();
        runtime.spawn(async move {
            if let Err(e) = scope.skip_waiting().await {
                logger.warn(&format!("skipWaiting failed: {e}"));
            }
        });
        Ok(())
    })
}

/// Navigate every window client to its current URL on activate.
pub fn reload_clients(order: Option<i32>) -> Plugin {
    crate::assets::ordered(Plugin::new("reload-clients"), order)
        .on_activate(|_event, ctx| async move { reload_windows(&ctx).await })
}

/// Claim open clients, then reload them under the new worker.
pub fn claim_and_reload_clients() -> Plugin {
    Plugin::new("claim-and-reload-clients").on_activate(|_event, ctx| async move {
        ctx.scope().clients().claim().await?;
        reload_windows(&ctx).await
    })
}

async fn reload_windows(ctx: &PluginContext) -> anyhow::Result<()> {
    let clients = ctx.scope().clients();
    let windows = clients.match_all(ClientQuery::windows(false)).await?;
    try_join_all(windows.iter().map(|w| clients.navigate(&w.id, &w.url))).await?;
    ctx.logger.debug(&format!("Reloaded {} clients", windows.len()));
    Ok(())
}
