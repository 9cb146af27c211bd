use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use celestia_core::OwnerId;

/// Notification templates known to the pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    /// The owner's generated content has been released.
    ContentReady,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTemplate::ContentReady => "content_ready",
        }
    }
}

impl std::fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Outbound notification service.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(
        &self,
        owner: &OwnerId,
        template: NotificationTemplate,
        data: &serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no delivery channel is configured.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        owner: &OwnerId,
        template: NotificationTemplate,
        data: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(owner = %owner, template = %template, data = %data, "notification");
        Ok(())
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub owner: OwnerId,
    pub template: NotificationTemplate,
    pub data: serde_json::Value,
}

/// In-memory notifier for tests. Can be told to fail the next N sends, or to
/// reject every send to a given owner.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failures_left: AtomicUsize,
    rejected: Mutex<HashSet<OwnerId>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn reject_owner(&self, owner: OwnerId) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(owner);
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        owner: &OwnerId,
        template: NotificationTemplate,
        data: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(NotifyError::Transport("simulated outage".to_string()));
        }
        let rejected = self
            .rejected
            .lock()
            .map(|r| r.contains(owner))
            .unwrap_or(false);
        if rejected {
            return Err(NotifyError::Rejected {
                status: 400,
                message: format!("recipient {owner} refused"),
            });
        }

        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("recording lock poisoned".to_string()))?
            .push(SentNotification {
                owner: owner.clone(),
                template,
                data: data.clone(),
            });
        Ok(())
    }
}
