//! Reusable policies built on the plugin engine.
//!
//! Every function here returns a ready [`Plugin`](swplug_plugins::Plugin);
//! presets return the plugin lists for common worker shapes.

pub mod assets;
pub mod fetch;
pub mod lifecycle;
pub mod presets;

pub use assets::{
    AssetCache, precache, precache_and_notify, precache_missing, prune_stale_cache,
    restore_asset_to_cache,
};
pub use fetch::{
    cache_first, network_first, serve_from_cache, serve_range_passthrough, stale_while_revalidate,
};
pub use lifecycle::{
    claim, claim_and_reload_clients, reload_clients, skip_waiting, skip_waiting_on_message,
};
pub use presets::{
    activate_immediately, activate_on_next_visit, activate_on_signal, offline_first,
    preset_plugins,
};
