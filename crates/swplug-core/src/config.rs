//! Worker configuration loading and validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SwplugError};
use crate::protocol::{SW_MSG_SKIP_WAITING, SW_PING_PATH};

/// Top-level worker configuration.
///
/// Everything a preset needs to assemble its plugin list, plus the
/// `extra` map of plugin-declared fields that is passed verbatim into the
/// plugin context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Version reported to pages that ask for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Base path the app is served under (default `/`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,

    #[serde(default)]
    pub assets: Vec<String>,

    /// Liveness path answered with 204. Empty string disables it.
    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    #[serde(default = "default_skip_waiting_message_type")]
    pub skip_waiting_message_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Plugin-declared fields, handed to every plugin through the context.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: None,
            base: None,
            cache_name: None,
            assets: Vec::new(),
            ping_path: default_ping_path(),
            skip_waiting_message_type: default_skip_waiting_message_type(),
            preset: None,
            logging: None,
            extra: HashMap::new(),
        }
    }
}

fn default_ping_path() -> String {
    SW_PING_PATH.into()
}

fn default_skip_waiting_message_type() -> String {
    SW_MSG_SKIP_WAITING.into()
}

/// Ready-made worker shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Precache on install, serve from cache on fetch.
    OfflineFirst,
    /// Offline-first plus skip-waiting and claim.
    ActivateImmediately,
    /// Offline-first; activate when the page sends the skip-waiting message.
    ActivateOnSignal,
    /// Offline-first; the new version takes over on the next visit.
    ActivateOnNextVisit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "swplug_plugins=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| SwplugError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl WorkerConfig {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5).
    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted).map_err(|e| SwplugError::Config(e.to_string()))
    }

    /// Default config path: `~/.swplug/config.json5`
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json5")
    }

    /// Ping path, or `None` when disabled.
    pub fn ping_path(&self) -> Option<&str> {
        if self.ping_path.is_empty() {
            None
        } else {
            Some(&self.ping_path)
        }
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(preset) = self.preset {
            if self.cache_name.as_deref().is_none_or(str::is_empty) {
                errors.push(format!("Preset {preset:?} requires a cache_name"));
            }
            if self.assets.is_empty() {
                warnings.push(format!("Preset {preset:?} has an empty asset list; nothing will be precached"));
            }
        }

        if !self.ping_path.is_empty() && !self.ping_path.starts_with('/') {
            errors.push(format!("ping_path must start with '/': {}", self.ping_path));
        }

        if let Some(base) = &self.base {
            if !base.starts_with('/') {
                errors.push(format!("base must start with '/': {base}"));
            }
        }

        if self.version.is_none() {
            warnings.push("No version configured; version queries will go unanswered".to_string());
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

/// Base directory for swplug data: `~/.swplug/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".swplug")
}
