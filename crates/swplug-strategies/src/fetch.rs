//! Fetch-time caching policies.
//!
//! Each policy works against one named cache and answers with `Ok(None)`
//! when it has nothing to offer, so later plugins still get a chance.

use std::sync::Arc;

use swplug_core::request::{Request, Response};
use swplug_core::scope::Cache;
use swplug_plugins::{Plugin, PluginContext};

use crate::assets::ordered;

/// Answer from the cache when the request is stored there.
pub fn serve_from_cache(cache_name: impl Into<String>, order: Option<i32>) -> Plugin {
    let cache_name = cache_name.into();
    ordered(Plugin::new("serve-from-cache"), order).on_fetch(move |event, ctx| {
        let cache_name = cache_name.clone();
        async move {
            let cache = ctx.scope().caches().open(&cache_name).await?;
            cache.match_request(&event.request).await
        }
    })
}

/// Cache, then network. Successful network responses are stored.
///
/// A network failure on a miss passes the request on.
pub fn cache_first(cache_name: impl Into<String>, order: Option<i32>) -> Plugin {
    let cache_name = cache_name.into();
    ordered(Plugin::new("cache-first"), order).on_fetch(move |event, ctx| {
        let cache_name = cache_name.clone();
        async move {
            let cache = ctx.scope().caches().open(&cache_name).await?;
            if let Some(cached) = cache.match_url(&event.request.url).await? {
                return Ok(Some(cached));
            }

            match ctx.fetch_passthrough(&event.request).await {
                Ok(response) => {
                    store_if_ok(cache.as_ref(), &event.request, &response).await?;
                    Ok(Some(response))
                }
                Err(e) => {
                    ctx.logger
                        .debug(&format!("cache-first miss and network failed for {}: {e}", event.request.url));
                    Ok(None)
                }
            }
        }
    })
}

/// Network, then cache. Successful network responses are stored.
pub fn network_first(cache_name: impl Into<String>, order: Option<i32>) -> Plugin {
    let cache_name = cache_name.into();
    ordered(Plugin::new("network-first"), order).on_fetch(move |event, ctx| {
        let cache_name = cache_name.clone();
        async move {
            let cache = ctx.scope().caches().open(&cache_name).await?;
            match ctx.fetch_passthrough(&event.request).await {
                Ok(response) => {
                    store_if_ok(cache.as_ref(), &event.request, &response).await?;
                    Ok(Some(response))
                }
                Err(e) => {
                    ctx.logger
                        .debug(&format!("Network failed for {}, trying cache: {e}", event.request.url));
                    cache.match_request(&event.request).await
                }
            }
        }
    })
}

/// Answer from the cache right away and refresh the entry in the
/// background. A miss waits for the network.
pub fn stale_while_revalidate(cache_name: impl Into<String>, order: Option<i32>) -> Plugin {
    let cache_name = cache_name.into();
    ordered(Plugin::new("stale-while-revalidate"), order).on_fetch(move |event, ctx| {
        let cache_name = cache_name.clone();
        async move {
            let cache = ctx.scope().caches().open(&cache_name).await?;
            let Some(cached) = cache.match_request(&event.request).await? else {
                let response = revalidate(&ctx, cache.as_ref(), &event.request).await?;
                return Ok(Some(response));
            };

            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let request = event.request.clone();
                    runtime.spawn(async move {
                        if let Err(e) = revalidate(&ctx, cache.as_ref(), &request).await {
                            ctx.logger
                                .debug(&format!("Background revalidation of {} failed: {e}", request.url));
                        }
                    });
                }
                Err(_) => ctx.logger.warn("No async runtime; revalidation skipped"),
            }
            Ok(Some(cached))
        }
    })
}

/// Requests carrying a `Range` header go straight to the network.
pub fn serve_range_passthrough(order: Option<i32>) -> Plugin {
    ordered(Plugin::new("serve-range-passthrough"), order).on_fetch(|event, ctx| async move {
        if !event.request.has_header("range") {
            return Ok(None);
        }
        ctx.fetch_passthrough(&event.request).await.map(Some)
    })
}

async fn revalidate(ctx: &Arc<PluginContext>, cache: &dyn Cache, request: &Request) -> anyhow::Result<Response> {
    let response = ctx.fetch_passthrough(request).await?;
    store_if_ok(cache, request, &response).await?;
    Ok(response)
}

async fn store_if_ok(cache: &dyn Cache, request: &Request, response: &Response) -> anyhow::Result<()> {
    if response.is_ok() {
        cache.put(request, response.clone()).await?;
    }
    Ok(())
}
