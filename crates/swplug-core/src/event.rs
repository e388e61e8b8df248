//! Host event kinds and their payloads.
//!
//! The set of kinds is fixed by the host platform; plugins cannot add new
//! ones. Payloads are shared behind `Arc` so one occurrence can be handed
//! to every handler (and to the error callback) without copying.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::Request;

/// Every event the host platform can raise on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
    Sync,
    PeriodicSync,
    Push,
    BackgroundFetchSuccess,
    BackgroundFetchFail,
    BackgroundFetchAbort,
    BackgroundFetchClick,
    Error,
    MessageError,
    UnhandledRejection,
    RejectionHandled,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::Install,
        EventKind::Activate,
        EventKind::Fetch,
        EventKind::Message,
        EventKind::Sync,
        EventKind::PeriodicSync,
        EventKind::Push,
        EventKind::BackgroundFetchSuccess,
        EventKind::BackgroundFetchFail,
        EventKind::BackgroundFetchAbort,
        EventKind::BackgroundFetchClick,
        EventKind::Error,
        EventKind::MessageError,
        EventKind::UnhandledRejection,
        EventKind::RejectionHandled,
    ];

    /// Global diagnostic channels. These are never routed to plugins.
    pub const GLOBAL: [EventKind; 4] = [
        EventKind::Error,
        EventKind::MessageError,
        EventKind::UnhandledRejection,
        EventKind::RejectionHandled,
    ];

    /// The host's event name (what `addEventListener` would be called with).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Message => "message",
            EventKind::Sync => "sync",
            EventKind::PeriodicSync => "periodicsync",
            EventKind::Push => "push",
            EventKind::BackgroundFetchSuccess => "backgroundfetchsuccess",
            EventKind::BackgroundFetchFail => "backgroundfetchfail",
            EventKind::BackgroundFetchAbort => "backgroundfetchabort",
            EventKind::BackgroundFetchClick => "backgroundfetchclick",
            EventKind::Error => "error",
            EventKind::MessageError => "messageerror",
            EventKind::UnhandledRejection => "unhandledrejection",
            EventKind::RejectionHandled => "rejectionhandled",
        }
    }

    pub fn is_global(&self) -> bool {
        Self::GLOBAL.contains(self)
    }

    pub fn is_background_fetch(&self) -> bool {
        matches!(
            self,
            EventKind::BackgroundFetchSuccess
                | EventKind::BackgroundFetchFail
                | EventKind::BackgroundFetchAbort
                | EventKind::BackgroundFetchClick
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `install` and `activate`.
#[derive(Debug, Clone)]
pub struct ExtendableEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl ExtendableEvent {
    pub fn install() -> Self {
        Self {
            kind: EventKind::Install,
            timestamp: Utc::now(),
        }
    }

    pub fn activate() -> Self {
        Self {
            kind: EventKind::Activate,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub request: Request,
    /// Id of the client (page) that issued the request, if any.
    pub client_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            client_id: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: serde_json::Value,
    /// Id of the posting client, used to reply.
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            source: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_client(data: serde_json::Value, client_id: impl Into<String>) -> Self {
        Self {
            data,
            source: Some(client_id.into()),
            timestamp: Utc::now(),
        }
    }

    /// The `type` discriminator of the message, if the payload carries one.
    pub fn message_type(&self) -> Option<&str> {
        self.data.get("type").and_then(|t| t.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub tag: String,
    pub last_chance: bool,
}

#[derive(Debug, Clone)]
pub struct PeriodicSyncEvent {
    pub tag: String,
}

#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }

    pub fn json(&self) -> Option<serde_json::Result<serde_json::Value>> {
        self.data.as_ref().map(|d| serde_json::from_slice(d))
    }
}

/// State of a background fetch as reported by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackgroundFetchRegistration {
    pub id: String,
    #[serde(default)]
    pub upload_total: u64,
    #[serde(default)]
    pub uploaded: u64,
    #[serde(default)]
    pub download_total: u64,
    #[serde(default)]
    pub downloaded: u64,
    /// `""`, `"success"`, or `"failure"`.
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub failure_reason: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundFetchEvent {
    /// One of the four `backgroundfetch*` kinds.
    pub kind: EventKind,
    pub registration: BackgroundFetchRegistration,
}

/// Uncaught error raised on the worker's global scope.
#[derive(Debug, Clone, Default)]
pub struct ErrorEvent {
    pub message: String,
    pub filename: Option<String>,
    pub lineno: Option<u32>,
    pub error: serde_json::Value,
}

/// A message that could not be deserialized.
#[derive(Debug, Clone, Default)]
pub struct MessageErrorEvent {
    pub data: serde_json::Value,
}

/// `unhandledrejection` / `rejectionhandled`.
#[derive(Debug, Clone)]
pub struct RejectionEvent {
    pub kind: EventKind,
    pub reason: serde_json::Value,
}

/// One event occurrence of any kind.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install(Arc<ExtendableEvent>),
    Activate(Arc<ExtendableEvent>),
    Fetch(Arc<FetchEvent>),
    Message(Arc<MessageEvent>),
    Sync(Arc<SyncEvent>),
    PeriodicSync(Arc<PeriodicSyncEvent>),
    Push(Arc<PushEvent>),
    BackgroundFetch(Arc<BackgroundFetchEvent>),
    Error(Arc<ErrorEvent>),
    MessageError(Arc<MessageErrorEvent>),
    Rejection(Arc<RejectionEvent>),
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install(_) => EventKind::Install,
            WorkerEvent::Activate(_) => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Message(_) => EventKind::Message,
            WorkerEvent::Sync(_) => EventKind::Sync,
            WorkerEvent::PeriodicSync(_) => EventKind::PeriodicSync,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::BackgroundFetch(e) => e.kind,
            WorkerEvent::Error(_) => EventKind::Error,
            WorkerEvent::MessageError(_) => EventKind::MessageError,
            WorkerEvent::Rejection(e) => e.kind,
        }
    }
}

/// Display options of a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default)]
    pub silent: bool,
}

/// Title plus display options, as handed to `showNotification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(flatten)]
    pub options: NotificationOptions,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            options: NotificationOptions::default(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.options.body = Some(body.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_host_events() {
        assert_eq!(EventKind::PeriodicSync.as_str(), "periodicsync");
        assert_eq!(EventKind::BackgroundFetchClick.to_string(), "backgroundfetchclick");
        assert_eq!(
            serde_json::to_value(EventKind::UnhandledRejection).unwrap(),
            serde_json::json!("unhandledrejection")
        );
    }

    #[test]
    fn test_global_kinds() {
        let globals: Vec<_> = EventKind::ALL.iter().filter(|k| k.is_global()).collect();
        assert_eq!(globals.len(), 4);
        assert!(!EventKind::Push.is_global());
    }

    #[test]
    fn test_message_type() {
        let ev = MessageEvent::new(serde_json::json!({"type": "PING", "n": 1}));
        assert_eq!(ev.message_type(), Some("PING"));
        let ev = MessageEvent::new(serde_json::json!("raw"));
        assert_eq!(ev.message_type(), None);
    }

    #[test]
    fn test_notification_payload_flattens_options() {
        let payload: NotificationPayload =
            serde_json::from_str(r#"{"title": "Hi", "body": "there", "silent": true}"#).unwrap();
        assert_eq!(payload.title, "Hi");
        assert_eq!(payload.options.body.as_deref(), Some("there"));
        assert!(payload.options.silent);
    }

    #[test]
    fn test_worker_event_kind_for_background_fetch() {
        let ev = WorkerEvent::BackgroundFetch(Arc::new(BackgroundFetchEvent {
            kind: EventKind::BackgroundFetchAbort,
            registration: BackgroundFetchRegistration::default(),
        }));
        assert_eq!(ev.kind(), EventKind::BackgroundFetchAbort);
    }
}
