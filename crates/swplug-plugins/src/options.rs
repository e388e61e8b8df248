//! Initialization options.

use std::collections::HashMap;
use std::sync::Arc;

use swplug_core::config::WorkerConfig;
use swplug_core::event::WorkerEvent;
use swplug_core::protocol::SW_PING_PATH;

use crate::context::Logger;
use crate::errors::{DispatchError, ErrorKind};

/// User error callback: `(error, triggering event, classification)`.
///
/// Returning `Err` (or panicking) is tolerated; the failure is only logged.
pub type ErrorCallback =
    Arc<dyn Fn(&DispatchError, &WorkerEvent, ErrorKind) -> anyhow::Result<()> + Send + Sync>;

/// Options for [`initialize`](crate::initialize).
#[derive(Clone)]
pub struct WorkerOptions {
    /// Logger handed to plugins. Defaults to [`TracingLogger`](crate::TracingLogger).
    pub logger: Option<Arc<dyn Logger>>,
    pub on_error: Option<ErrorCallback>,
    /// Enables the built-in version plugin when set.
    pub version: Option<String>,
    pub base: Option<String>,
    /// Enables the built-in ping plugin when set.
    pub ping_path: Option<String>,
    /// Plugin-declared fields.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            logger: None,
            on_error: None,
            version: None,
            base: None,
            ping_path: Some(SW_PING_PATH.to_string()),
            metadata: HashMap::new(),
        }
    }
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        let mut metadata = config.extra.clone();
        if let Some(cache_name) = &config.cache_name {
            metadata.insert("cache_name".into(), serde_json::Value::String(cache_name.clone()));
        }
        if !config.assets.is_empty() {
            metadata.insert("assets".into(), serde_json::json!(config.assets));
        }
        Self {
            logger: None,
            on_error: None,
            version: config.version.clone(),
            base: config.base.clone(),
            ping_path: config.ping_path().map(str::to_string),
            metadata,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&DispatchError, &WorkerEvent, ErrorKind) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_ping_path(mut self, path: Option<String>) -> Self {
        self.ping_path = path;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("logger", &self.logger.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("version", &self.version)
            .field("base", &self.base)
            .field("ping_path", &self.ping_path)
            .field("metadata", &self.metadata)
            .finish()
    }
}
