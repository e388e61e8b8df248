//! Asset-list policies: filling, pruning and repairing one named cache.

use std::collections::HashSet;

use anyhow::{Context as _, bail};
use futures::future::{join_all, try_join_all};

use swplug_core::protocol::{SW_MSG_INSTALLED, SW_MSG_START_INSTALLING};
use swplug_core::request::Request;
use swplug_core::scope::Cache;
use swplug_plugins::{Plugin, PluginContext};

/// A cache name plus the asset list it should hold.
///
/// Asset entries are paths (resolved against the worker's base path) or
/// absolute URLs.
#[derive(Debug, Clone, Default)]
pub struct AssetCache {
    pub cache_name: String,
    pub assets: Vec<String>,
    pub order: Option<i32>,
}

impl AssetCache {
    pub fn new(cache_name: impl Into<String>, assets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cache_name: cache_name.into(),
            assets: assets.into_iter().map(Into::into).collect(),
            order: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub(crate) fn plugin(&self, name: &str) -> Plugin {
        ordered(Plugin::new(name), self.order)
    }
}

pub(crate) fn ordered(plugin: Plugin, order: Option<i32>) -> Plugin {
    match order {
        Some(order) => plugin.with_order(order),
        None => plugin,
    }
}

/// Fetch every URL, then store them all. Nothing is stored if any fetch
/// fails or answers with a non-2xx status.
pub(crate) async fn add_all(ctx: &PluginContext, cache: &dyn Cache, urls: &[String]) -> anyhow::Result<()> {
    let requests: Vec<Request> = urls.iter().map(Request::get).collect();
    let responses = join_all(requests.iter().map(|r| ctx.fetch_passthrough(r))).await;

    let mut fetched = Vec::with_capacity(requests.len());
    for (request, response) in requests.iter().zip(responses) {
        let response = response.with_context(|| format!("Failed to fetch {}", request.url))?;
        if !response.is_ok() {
            bail!("{} answered {}", request.url, response.status);
        }
        fetched.push((request, response));
    }

    for (request, response) in fetched {
        cache.put(request, response).await?;
    }
    Ok(())
}

/// Store every asset on install.
pub fn precache(config: AssetCache) -> Plugin {
    config.plugin("precache").on_install(move |_event, ctx| {
        let config = config.clone();
        async move {
            let urls = ctx.resolve_asset_urls(&config.assets)?;
            let cache = ctx.scope().caches().open(&config.cache_name).await?;
            add_all(&ctx, cache.as_ref(), &urls).await?;
            ctx.logger
                .debug(&format!("Precached {} assets into {}", urls.len(), config.cache_name));
            Ok(())
        }
    })
}

/// Store on install only the assets the cache does not already hold.
pub fn precache_missing(config: AssetCache) -> Plugin {
    config.plugin("precache-missing").on_install(move |_event, ctx| {
        let config = config.clone();
        async move {
            let cache = ctx.scope().caches().open(&config.cache_name).await?;
            let cached: HashSet<String> = cache
                .keys()
                .await?
                .iter()
                .filter_map(|key| ctx.normalize_url(key).ok())
                .collect();

            let mut seen = HashSet::new();
            let missing: Vec<String> = ctx
                .resolve_asset_urls(&config.assets)?
                .into_iter()
                .filter(|url| !cached.contains(url) && seen.insert(url.clone()))
                .collect();

            if missing.is_empty() {
                return Ok(());
            }
            add_all(&ctx, cache.as_ref(), &missing).await?;
            ctx.logger.debug(&format!(
                "Added {} missing assets to {}",
                missing.len(),
                config.cache_name
            ));
            Ok(())
        }
    })
}

/// On activate, delete every entry that is not in the asset list.
pub fn prune_stale_cache(config: AssetCache) -> Plugin {
    config.plugin("prune-stale-cache").on_activate(move |_event, ctx| {
        let config = config.clone();
        async move {
            let keep: HashSet<String> = ctx.resolve_asset_urls(&config.assets)?.into_iter().collect();
            let cache = ctx.scope().caches().open(&config.cache_name).await?;

            let stale: Vec<String> = cache
                .keys()
                .await?
                .into_iter()
                .filter(|key| {
                    ctx.normalize_url(key)
                        .map(|url| !keep.contains(&url))
                        .unwrap_or(true)
                })
                .collect();

            try_join_all(stale.iter().map(|key| cache.delete(key))).await?;
            if !stale.is_empty() {
                ctx.logger
                    .debug(&format!("Pruned {} stale entries from {}", stale.len(), config.cache_name));
            }
            Ok(())
        }
    })
}

/// Serve listed assets from the cache, refetching (and re-storing) any
/// that went missing. Other requests are passed on.
pub fn restore_asset_to_cache(config: AssetCache) -> Plugin {
    config.plugin("restore-asset-to-cache").on_fetch(move |event, ctx| {
        let config = config.clone();
        async move {
            let assets = ctx.resolve_asset_urls(&config.assets)?;
            let Ok(url) = ctx.normalize_url(&event.request.url) else {
                return Ok(None);
            };
            if !assets.contains(&url) {
                return Ok(None);
            }

            let cache = ctx.scope().caches().open(&config.cache_name).await?;
            if let Some(cached) = cache.match_url(&url).await? {
                return Ok(Some(cached));
            }

            match ctx.fetch_passthrough(&event.request).await {
                Ok(response) => {
                    if response.is_ok() {
                        cache.put(&Request::get(url), response.clone()).await?;
                    }
                    Ok(Some(response))
                }
                Err(e) => {
                    ctx.logger.debug(&format!("Could not restore {url}: {e}"));
                    Ok(None)
                }
            }
        }
    })
}

/// [`precache`] bracketed by client notifications.
///
/// Window clients get `start_message` before the assets are fetched and
/// `installed_message` once they are stored.
pub fn precache_and_notify(
    config: AssetCache,
    start_message: Option<String>,
    installed_message: Option<String>,
) -> Plugin {
    let start = start_message.unwrap_or_else(|| SW_MSG_START_INSTALLING.to_string());
    let installed = installed_message.unwrap_or_else(|| SW_MSG_INSTALLED.to_string());

    config.plugin("precache-and-notify").on_install(move |_event, ctx| {
        let config = config.clone();
        let start = start.clone();
        let installed = installed.clone();
        async move {
            ctx.notify_clients(&start, None, false).await?;
            let urls = ctx.resolve_asset_urls(&config.assets)?;
            let cache = ctx.scope().caches().open(&config.cache_name).await?;
            add_all(&ctx, cache.as_ref(), &urls).await?;
            ctx.notify_clients(&installed, None, false).await?;
            Ok(())
        }
    })
}
