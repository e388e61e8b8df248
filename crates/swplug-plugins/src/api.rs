//! Plugin descriptor and handler registration.
//!
//! A [`Plugin`] is a capability record: a name, an optional order, and one
//! optional handler slot per event kind. Whether a plugin takes part in an
//! event is decided by whether the slot is set.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use swplug_core::event::{
    BackgroundFetchEvent, EventKind, ExtendableEvent, FetchEvent, MessageEvent,
    NotificationPayload, PeriodicSyncEvent, PushEvent, SyncEvent,
};
use swplug_core::request::Response;

use crate::context::PluginContext;

/// Async handler for lifecycle-extending events.
pub type LifecycleHandler<E> = Arc<
    dyn Fn(Arc<E>, Arc<PluginContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

/// Async fetch handler. `Ok(None)` passes the request on to the next plugin.
pub type FetchHandler = Arc<
    dyn Fn(Arc<FetchEvent>, Arc<PluginContext>) -> BoxFuture<'static, anyhow::Result<Option<Response>>>
        + Send
        + Sync,
>;

/// Async push handler.
pub type PushHandler = Arc<
    dyn Fn(Arc<PushEvent>, Arc<PluginContext>) -> BoxFuture<'static, anyhow::Result<PushOutcome>>
        + Send
        + Sync,
>;

/// Synchronous message handler. Async work it starts is not awaited.
pub type MessageHandler = Arc<dyn Fn(&MessageEvent, &PluginContext) -> anyhow::Result<()> + Send + Sync>;

/// What a push handler contributes.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// No opinion; counts towards the default payload parsing.
    Nothing,
    /// Display this notification.
    Show(NotificationPayload),
    /// Explicitly suppress the default notification.
    Suppress,
}

/// Optional handler slots, one per plugin-routed event kind.
#[derive(Clone, Default)]
pub struct Handlers {
    pub install: Option<LifecycleHandler<ExtendableEvent>>,
    pub activate: Option<LifecycleHandler<ExtendableEvent>>,
    pub fetch: Option<FetchHandler>,
    pub message: Option<MessageHandler>,
    pub sync: Option<LifecycleHandler<SyncEvent>>,
    pub periodic_sync: Option<LifecycleHandler<PeriodicSyncEvent>>,
    pub push: Option<PushHandler>,
    pub background_fetch_success: Option<LifecycleHandler<BackgroundFetchEvent>>,
    pub background_fetch_fail: Option<LifecycleHandler<BackgroundFetchEvent>>,
    pub background_fetch_abort: Option<LifecycleHandler<BackgroundFetchEvent>>,
    pub background_fetch_click: Option<LifecycleHandler<BackgroundFetchEvent>>,
}

impl Handlers {
    pub fn has(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Install => self.install.is_some(),
            EventKind::Activate => self.activate.is_some(),
            EventKind::Fetch => self.fetch.is_some(),
            EventKind::Message => self.message.is_some(),
            EventKind::Sync => self.sync.is_some(),
            EventKind::PeriodicSync => self.periodic_sync.is_some(),
            EventKind::Push => self.push.is_some(),
            EventKind::BackgroundFetchSuccess => self.background_fetch_success.is_some(),
            EventKind::BackgroundFetchFail => self.background_fetch_fail.is_some(),
            EventKind::BackgroundFetchAbort => self.background_fetch_abort.is_some(),
            EventKind::BackgroundFetchClick => self.background_fetch_click.is_some(),
            EventKind::Error
            | EventKind::MessageError
            | EventKind::UnhandledRejection
            | EventKind::RejectionHandled => false,
        }
    }
}

/// A named, optionally ordered bundle of event handlers.
///
/// ```ignore
/// let plugin = Plugin::new("offline-page")
///     .with_order(10)
///     .on_fetch(|event, ctx| async move {
///         let cache = ctx.scope().caches().open("pages").await?;
///         cache.match_request(&event.request).await
///     });
/// ```
#[derive(Clone)]
pub struct Plugin {
    name: String,
    order: Option<i32>,
    handlers: Handlers,
}

fn lifecycle<E, F, Fut>(f: F) -> LifecycleHandler<E>
where
    E: Send + Sync + 'static,
    F: Fn(Arc<E>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event, ctx| f(event, ctx).boxed())
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
            handlers: Handlers::default(),
        }
    }

    /// Set the dispatch position. Lower runs first; unset counts as 0.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    /// Key used by the registry merge.
    pub fn sort_key(&self) -> i32 {
        self.order.unwrap_or(0)
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.has(kind)
    }

    pub fn on_install<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ExtendableEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.install = Some(lifecycle(f));
        self
    }

    pub fn on_activate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ExtendableEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.activate = Some(lifecycle(f));
        self
    }

    pub fn on_fetch<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<FetchEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Response>>> + Send + 'static,
    {
        self.handlers.fetch = Some(Arc::new(move |event, ctx| f(event, ctx).boxed()));
        self
    }

    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&MessageEvent, &PluginContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.message = Some(Arc::new(f));
        self
    }

    pub fn on_sync<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<SyncEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.sync = Some(lifecycle(f));
        self
    }

    pub fn on_periodic_sync<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PeriodicSyncEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.periodic_sync = Some(lifecycle(f));
        self
    }

    pub fn on_push<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PushEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PushOutcome>> + Send + 'static,
    {
        self.handlers.push = Some(Arc::new(move |event, ctx| f(event, ctx).boxed()));
        self
    }

    /// Register a handler for one of the four `backgroundfetch*` kinds.
    ///
    /// Any other kind leaves the plugin unchanged.
    pub fn on_background_fetch<F, Fut>(mut self, kind: EventKind, f: F) -> Self
    where
        F: Fn(Arc<BackgroundFetchEvent>, Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let slot = match kind {
            EventKind::BackgroundFetchSuccess => &mut self.handlers.background_fetch_success,
            EventKind::BackgroundFetchFail => &mut self.handlers.background_fetch_fail,
            EventKind::BackgroundFetchAbort => &mut self.handlers.background_fetch_abort,
            EventKind::BackgroundFetchClick => &mut self.handlers.background_fetch_click,
            _ => {
                tracing::warn!(plugin = %self.name, %kind, "Not a background fetch event; handler ignored");
                return self;
            }
        };
        *slot = Some(lifecycle(f));
        self
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = EventKind::ALL
            .iter()
            .filter(|k| self.handles(**k))
            .map(|k| k.as_str())
            .collect();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("handles", &kinds)
            .finish()
    }
}
