//! Notification display that only records what it was asked to show.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use swplug_core::event::NotificationPayload;
use swplug_core::scope::Notifications;

use crate::lock;

#[derive(Debug, Default)]
pub struct RecordingNotifications {
    shown: Mutex<Vec<NotificationPayload>>,
    denied: AtomicBool,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate revoked notification permission: every `show` fails.
    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    pub fn shown(&self) -> Vec<NotificationPayload> {
        lock(&self.shown).clone()
    }
}

#[async_trait]
impl Notifications for RecordingNotifications {
    async fn show(&self, notification: &NotificationPayload) -> anyhow::Result<()> {
        if self.denied.load(Ordering::SeqCst) {
            anyhow::bail!("notification permission denied");
        }
        info!(title = %notification.title, "Showing notification");
        lock(&self.shown).push(notification.clone());
        Ok(())
    }
}
