//! Page <-> worker message protocol.
//!
//! Every message is a JSON object with a `type` discriminator. The engine
//! itself only answers version queries; the rest are used by lifecycle
//! plugins and presets.

use serde::{Deserialize, Serialize};

/// Path answered with `204 No Content` by the built-in ping plugin.
pub const SW_PING_PATH: &str = "/sw-ping";

/// Page -> worker: call `skipWaiting()` now.
pub const SW_MSG_SKIP_WAITING: &str = "SW_MSG_SKIP_WAITING";

/// Worker -> pages: precaching has started.
pub const SW_MSG_START_INSTALLING: &str = "SW_MSG_START_INSTALLING";

/// Worker -> pages: precaching finished.
pub const SW_MSG_INSTALLED: &str = "SW_MSG_INSTALLED";

/// Page -> worker: report your version.
pub const PLUGGABLE_SW_GET_VERSION: &str = "PLUGGABLE_SW_GET_VERSION";

/// Worker -> page: version report.
pub const PLUGGABLE_SW_VERSION: &str = "PLUGGABLE_SW_VERSION";

/// Messages the worker itself understands or emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "PLUGGABLE_SW_GET_VERSION")]
    GetVersion,

    #[serde(rename = "PLUGGABLE_SW_VERSION")]
    Version { version: String },

    #[serde(rename = "SW_MSG_SKIP_WAITING")]
    SkipWaiting,

    #[serde(rename = "SW_MSG_START_INSTALLING")]
    StartInstalling,

    #[serde(rename = "SW_MSG_INSTALLED")]
    Installed,
}

/// Build a broadcast payload `{ "type": message_type, ..data }`.
///
/// Non-object `data` is ignored; `data` never overrides `type`.
pub fn typed_message(message_type: &str, data: Option<&serde_json::Value>) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    if let Some(serde_json::Value::Object(fields)) = data {
        for (key, value) in fields {
            payload.insert(key.clone(), value.clone());
        }
    }
    payload.insert(
        "type".into(),
        serde_json::Value::String(message_type.to_string()),
    );
    serde_json::Value::Object(payload)
}
