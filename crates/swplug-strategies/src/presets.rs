//! Plugin lists for common worker shapes.

use swplug_core::config::{Preset, WorkerConfig};
use swplug_core::error::{Result, SwplugError};
use swplug_plugins::Plugin;

use crate::assets::{AssetCache, precache};
use crate::fetch::serve_from_cache;
use crate::lifecycle::{claim, skip_waiting, skip_waiting_on_message};

/// Precache on install, serve from the cache on fetch.
pub fn offline_first(config: &AssetCache) -> Vec<Plugin> {
    vec![
        precache(config.clone()),
        serve_from_cache(config.cache_name.clone(), config.order),
    ]
}

/// [`offline_first`], activating and claiming clients as soon as installed.
pub fn activate_immediately(config: &AssetCache) -> Vec<Plugin> {
    let mut plugins = offline_first(config);
    plugins.push(skip_waiting());
    plugins.push(claim());
    plugins
}

/// [`offline_first`], activating when a page posts `message_type`.
pub fn activate_on_signal(config: &AssetCache, message_type: Option<String>) -> Vec<Plugin> {
    let mut plugins = offline_first(config);
    plugins.push(skip_waiting_on_message(message_type));
    plugins.push(claim());
    plugins
}

/// [`offline_first`]; the new version waits until every old page is gone.
pub fn activate_on_next_visit(config: &AssetCache) -> Vec<Plugin> {
    offline_first(config)
}

/// Plugins for the preset named in `config`, or none when no preset is set.
pub fn preset_plugins(config: &WorkerConfig) -> Result<Vec<Plugin>> {
    let Some(preset) = config.preset else {
        return Ok(Vec::new());
    };
    let cache_name = config
        .cache_name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SwplugError::Config(format!("Preset {preset:?} requires a cache_name")))?;
    let assets = AssetCache::new(cache_name, config.assets.iter().cloned());

    Ok(match preset {
        Preset::OfflineFirst => offline_first(&assets),
        Preset::ActivateImmediately => activate_immediately(&assets),
        Preset::ActivateOnSignal => {
            activate_on_signal(&assets, Some(config.skip_waiting_message_type.clone()))
        }
        Preset::ActivateOnNextVisit => activate_on_next_visit(&assets),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plugins: &[Plugin]) -> Vec<&str> {
        plugins.iter().map(Plugin::name).collect()
    }

    fn assets() -> AssetCache {
        AssetCache::new("app-v1", ["/", "/app.js"])
    }

    #[test]
    fn test_preset_compositions() {
        assert_eq!(names(&offline_first(&assets())), vec!["precache", "serve-from-cache"]);
        assert_eq!(
            names(&activate_immediately(&assets())),
            vec!["precache", "serve-from-cache", "skip-waiting", "claim"]
        );
        assert_eq!(
            names(&activate_on_signal(&assets(), None)),
            vec!["precache", "serve-from-cache", "skip-waiting-on-message", "claim"]
        );
        assert_eq!(names(&activate_on_next_visit(&assets())), vec!["precache", "serve-from-cache"]);
    }

    #[test]
    fn test_no_preset_means_no_plugins() {
        let plugins = preset_plugins(&WorkerConfig::default()).unwrap();
        assert!(plugins.is_empty());
    }

    #[test]
    fn test_preset_requires_cache_name() {
        let config = WorkerConfig {
            preset: Some(Preset::OfflineFirst),
            ..Default::default()
        };
        let err = preset_plugins(&config).unwrap_err();
        assert!(matches!(err, SwplugError::Config(_)));
        assert!(err.to_string().contains("cache_name"));
    }

    #[test]
    fn test_preset_from_config() {
        let config = WorkerConfig {
            preset: Some(Preset::ActivateOnSignal),
            cache_name: Some("app-v1".into()),
            assets: vec!["/".into()],
            ..Default::default()
        };
        let plugins = preset_plugins(&config).unwrap();
        assert_eq!(plugins.len(), 4);
        assert_eq!(plugins[2].name(), "skip-waiting-on-message");
    }
}
