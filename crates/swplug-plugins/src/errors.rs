//! Error taxonomy and the reporting boundary.
//!
//! Every failure the engine observes ends up in [`ErrorReporter::report`]:
//! plugin errors and panics, a failed network fallback, a failed
//! notification, and the four global platform channels. Nothing is ever
//! re-raised to the host.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swplug_core::event::{EventKind, WorkerEvent};
use thiserror::Error;

use crate::context::Logger;
use crate::options::ErrorCallback;

/// Classification passed to the error callback.
///
/// Names both the event channel and whether the failure came from a
/// plugin body (`*_error`, `message_error_handler`) or from the platform's
/// global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "install_error")]
    InstallError,
    #[serde(rename = "activate_error")]
    ActivateError,
    #[serde(rename = "fetch_error")]
    FetchError,
    #[serde(rename = "messageerror")]
    MessageError,
    #[serde(rename = "message_error_handler")]
    MessageErrorHandler,
    #[serde(rename = "sync_error")]
    SyncError,
    #[serde(rename = "periodicsync_error")]
    PeriodicSyncError,
    #[serde(rename = "push_error")]
    PushError,
    #[serde(rename = "backgroundfetchsuccess_error")]
    BackgroundFetchSuccessError,
    #[serde(rename = "backgroundfetchfail_error")]
    BackgroundFetchFailError,
    #[serde(rename = "backgroundfetchabort_error")]
    BackgroundFetchAbortError,
    #[serde(rename = "backgroundfetchclick_error")]
    BackgroundFetchClickError,
    #[serde(rename = "unhandledrejection")]
    UnhandledRejection,
    #[serde(rename = "rejectionhandled")]
    RejectionHandled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Error => "error",
            ErrorKind::InstallError => "install_error",
            ErrorKind::ActivateError => "activate_error",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::MessageError => "messageerror",
            ErrorKind::MessageErrorHandler => "message_error_handler",
            ErrorKind::SyncError => "sync_error",
            ErrorKind::PeriodicSyncError => "periodicsync_error",
            ErrorKind::PushError => "push_error",
            ErrorKind::BackgroundFetchSuccessError => "backgroundfetchsuccess_error",
            ErrorKind::BackgroundFetchFailError => "backgroundfetchfail_error",
            ErrorKind::BackgroundFetchAbortError => "backgroundfetchabort_error",
            ErrorKind::BackgroundFetchClickError => "backgroundfetchclick_error",
            ErrorKind::UnhandledRejection => "unhandledrejection",
            ErrorKind::RejectionHandled => "rejectionhandled",
        }
    }

    /// Classification for a failure while dispatching `kind`.
    pub fn for_event(kind: EventKind) -> Self {
        match kind {
            EventKind::Install => ErrorKind::InstallError,
            EventKind::Activate => ErrorKind::ActivateError,
            EventKind::Fetch => ErrorKind::FetchError,
            EventKind::Message => ErrorKind::MessageErrorHandler,
            EventKind::Sync => ErrorKind::SyncError,
            EventKind::PeriodicSync => ErrorKind::PeriodicSyncError,
            EventKind::Push => ErrorKind::PushError,
            EventKind::BackgroundFetchSuccess => ErrorKind::BackgroundFetchSuccessError,
            EventKind::BackgroundFetchFail => ErrorKind::BackgroundFetchFailError,
            EventKind::BackgroundFetchAbort => ErrorKind::BackgroundFetchAbortError,
            EventKind::BackgroundFetchClick => ErrorKind::BackgroundFetchClickError,
            EventKind::Error => ErrorKind::Error,
            EventKind::MessageError => ErrorKind::MessageError,
            EventKind::UnhandledRejection => ErrorKind::UnhandledRejection,
            EventKind::RejectionHandled => ErrorKind::RejectionHandled,
        }
    }

    /// `false` for the four global platform channels.
    pub fn is_plugin_level(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Error
                | ErrorKind::MessageError
                | ErrorKind::UnhandledRejection
                | ErrorKind::RejectionHandled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error value handed to the callback.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("plugin '{plugin}' panicked: {message}")]
    Panic { plugin: String, message: String },

    #[error("network fallback failed: {0}")]
    Network(#[source] anyhow::Error),

    #[error("failed to show notification: {0}")]
    Notification(#[source] anyhow::Error),

    /// A platform-native error or rejection reason from a global channel.
    #[error("{message}")]
    Platform {
        message: String,
        value: serde_json::Value,
    },
}

impl DispatchError {
    /// Name of the plugin that failed, if the error came from a plugin.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            DispatchError::Plugin { plugin, .. } | DispatchError::Panic { plugin, .. } => Some(plugin),
            _ => None,
        }
    }

    /// Raw platform value for global-channel errors.
    pub fn platform_value(&self) -> Option<&serde_json::Value> {
        match self {
            DispatchError::Platform { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Routes classified errors to the user callback, shielding the caller
/// from anything the callback itself does wrong.
#[derive(Clone)]
pub struct ErrorReporter {
    logger: Arc<dyn Logger>,
    on_error: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub fn new(logger: Arc<dyn Logger>, on_error: Option<ErrorCallback>) -> Self {
        Self { logger, on_error }
    }

    pub fn report(&self, error: &DispatchError, event: &WorkerEvent, kind: ErrorKind) {
        tracing::debug!(%kind, event = %event.kind(), plugin = ?error.plugin(), "Reporting error");

        let Some(callback) = &self.on_error else {
            self.logger.warn(&format!("[{kind}] {error}"));
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| callback(error, event, kind))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.logger
                    .error(&format!("Error in {kind} error handler: {e}"));
            }
            Err(payload) => {
                self.logger.error(&format!(
                    "Error handler panicked while reporting {kind}: {}",
                    panic_message(payload.as_ref())
                ));
            }
        }
    }
}
