//! Registry merge: plugin list in, one ordered handler list per kind out.

use std::collections::HashMap;

use tracing::{debug, info};

use swplug_core::event::{
    BackgroundFetchEvent, EventKind, ExtendableEvent, PeriodicSyncEvent, SyncEvent,
};

use crate::api::{FetchHandler, LifecycleHandler, MessageHandler, Plugin, PushHandler};
use crate::context::Logger;

/// Stable sort by `order` ascending, missing order counting as 0.
///
/// Plugins with equal keys keep their registration order.
pub fn sort_plugins(plugins: &[Plugin]) -> Vec<&Plugin> {
    let mut sorted: Vec<&Plugin> = plugins.iter().collect();
    sorted.sort_by_key(|p| p.sort_key());
    sorted
}

/// Names that occur more than once, each listed once, in first-seen order.
pub fn duplicate_names(plugins: &[Plugin]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for plugin in plugins {
        let count = seen.entry(plugin.name()).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(plugin.name().to_string());
        }
    }
    duplicates
}

/// A handler together with the name of the plugin that contributed it.
#[derive(Clone)]
pub struct Registered<H> {
    pub plugin: String,
    pub handler: H,
}

/// Per-kind handler lists in dispatch order. Immutable once built.
#[derive(Clone, Default)]
pub struct HandlerTable {
    pub install: Vec<Registered<LifecycleHandler<ExtendableEvent>>>,
    pub activate: Vec<Registered<LifecycleHandler<ExtendableEvent>>>,
    pub fetch: Vec<Registered<FetchHandler>>,
    pub message: Vec<Registered<MessageHandler>>,
    pub sync: Vec<Registered<LifecycleHandler<SyncEvent>>>,
    pub periodic_sync: Vec<Registered<LifecycleHandler<PeriodicSyncEvent>>>,
    pub push: Vec<Registered<PushHandler>>,
    pub background_fetch_success: Vec<Registered<LifecycleHandler<BackgroundFetchEvent>>>,
    pub background_fetch_fail: Vec<Registered<LifecycleHandler<BackgroundFetchEvent>>>,
    pub background_fetch_abort: Vec<Registered<LifecycleHandler<BackgroundFetchEvent>>>,
    pub background_fetch_click: Vec<Registered<LifecycleHandler<BackgroundFetchEvent>>>,
}

fn push_slot<H: Clone>(list: &mut Vec<Registered<H>>, plugin: &Plugin, slot: &Option<H>) {
    if let Some(handler) = slot {
        list.push(Registered {
            plugin: plugin.name().to_string(),
            handler: handler.clone(),
        });
    }
}

impl HandlerTable {
    /// Merge `plugins` into per-kind lists.
    ///
    /// Logs one warning per duplicated name through `logger`; duplicates
    /// are otherwise registered like any other plugin.
    pub fn build(plugins: &[Plugin], logger: &dyn Logger) -> Self {
        for name in duplicate_names(plugins) {
            logger.warn(&format!("Duplicate plugin name: \"{name}\""));
        }

        let mut table = HandlerTable::default();
        for plugin in sort_plugins(plugins) {
            debug!(plugin = %plugin.name(), order = plugin.sort_key(), "Merging plugin");
            let h = plugin.handlers();
            push_slot(&mut table.install, plugin, &h.install);
            push_slot(&mut table.activate, plugin, &h.activate);
            push_slot(&mut table.fetch, plugin, &h.fetch);
            push_slot(&mut table.message, plugin, &h.message);
            push_slot(&mut table.sync, plugin, &h.sync);
            push_slot(&mut table.periodic_sync, plugin, &h.periodic_sync);
            push_slot(&mut table.push, plugin, &h.push);
            push_slot(&mut table.background_fetch_success, plugin, &h.background_fetch_success);
            push_slot(&mut table.background_fetch_fail, plugin, &h.background_fetch_fail);
            push_slot(&mut table.background_fetch_abort, plugin, &h.background_fetch_abort);
            push_slot(&mut table.background_fetch_click, plugin, &h.background_fetch_click);
        }

        info!(plugins = plugins.len(), "Plugin handlers merged");
        table
    }

    /// Lifecycle list for one of the four `backgroundfetch*` kinds.
    pub fn background_fetch(
        &self,
        kind: EventKind,
    ) -> &[Registered<LifecycleHandler<BackgroundFetchEvent>>] {
        match kind {
            EventKind::BackgroundFetchSuccess => &self.background_fetch_success,
            EventKind::BackgroundFetchFail => &self.background_fetch_fail,
            EventKind::BackgroundFetchAbort => &self.background_fetch_abort,
            EventKind::BackgroundFetchClick => &self.background_fetch_click,
            _ => &[],
        }
    }

    /// Plugin names registered for `kind`, in dispatch order.
    pub fn plugin_names(&self, kind: EventKind) -> Vec<&str> {
        fn names<H>(list: &[Registered<H>]) -> Vec<&str> {
            list.iter().map(|r| r.plugin.as_str()).collect()
        }
        match kind {
            EventKind::Install => names(&self.install),
            EventKind::Activate => names(&self.activate),
            EventKind::Fetch => names(&self.fetch),
            EventKind::Message => names(&self.message),
            EventKind::Sync => names(&self.sync),
            EventKind::PeriodicSync => names(&self.periodic_sync),
            EventKind::Push => names(&self.push),
            k if k.is_background_fetch() => names(self.background_fetch(k)),
            _ => Vec::new(),
        }
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.plugin_names(kind).len()
    }
}
