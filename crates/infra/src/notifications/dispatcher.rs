//! Sweep that sends the one-time "content ready" notification.
//!
//! Delivery is at-least-once: the flag is flipped only after a successful
//! send, so a crash in between re-sends on the next sweep. A failed send
//! leaves the flag untouched and the artifact is picked up again next tick.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use celestia_core::SharedClock;
use celestia_readings::GeneratedArtifact;

use super::notifier::{NotificationTemplate, Notifier};
use crate::artifacts::ArtifactStore;
use crate::error::StoreError;
use crate::scheduler::PeriodicTask;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Cumulative dispatcher statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatcherStats {
    pub sweeps: u64,
    pub sent: u64,
    pub failed: u64,
}

pub struct NotificationDispatcher {
    artifacts: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    batch_size: usize,
    stats: Mutex<DispatcherStats>,
}

impl NotificationDispatcher {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
        batch_size: usize,
    ) -> Self {
        Self {
            artifacts,
            notifier,
            clock,
            batch_size: batch_size.max(1),
            stats: Mutex::new(DispatcherStats::default()),
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Notify every released artifact in one batch.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let due = self.artifacts.due_for_notification(now, self.batch_size).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for artifact in &due {
            let data = notification_data(artifact);
            if let Err(e) = self
                .notifier
                .send(&artifact.owner_id, NotificationTemplate::ContentReady, &data)
                .await
            {
                warn!(artifact_id = %artifact.id, owner = %artifact.owner_id, error = %e, "notification failed; will retry next sweep");
                report.failed += 1;
                if let Err(e) = self.artifacts.record_notify_failure(artifact.id, now).await {
                    warn!(artifact_id = %artifact.id, error = %e, "failed to record notification attempt");
                }
                continue;
            }

            match self.artifacts.mark_notified(artifact.id, now).await {
                Ok(true) => {
                    info!(artifact_id = %artifact.id, owner = %artifact.owner_id, "content ready notification sent");
                    report.sent += 1;
                }
                Ok(false) => {
                    debug!(artifact_id = %artifact.id, "notification flag already set");
                }
                Err(e) => {
                    warn!(artifact_id = %artifact.id, error = %e, "notification sent but flag not recorded");
                    report.failed += 1;
                }
            }
        }

        if let Ok(mut stats) = self.stats.lock() {
            stats.sweeps += 1;
            stats.sent += report.sent as u64;
            stats.failed += report.failed as u64;
        }
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notification-dispatcher"
    }

    async fn tick(&self) -> Result<(), StoreError> {
        self.sweep().await.map(|_| ())
    }
}

/// Template data for [`NotificationTemplate::ContentReady`].
pub fn notification_data(artifact: &GeneratedArtifact) -> serde_json::Value {
    let mut data = serde_json::json!({
        "artifactId": artifact.id,
        "releaseAt": artifact.schedule.release_at,
    });
    if let Some(url) = artifact.image.public_url() {
        data["imageUrl"] = serde_json::Value::String(url.to_string());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::InMemoryArtifactStore;
    use crate::notifications::RecordingNotifier;
    use celestia_core::{ArtifactId, ManualClock, OwnerId, RequestId};
    use celestia_readings::{AstrologyProfile, ImageRef, ReleasePolicy};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn artifact(notify: bool) -> GeneratedArtifact {
        GeneratedArtifact {
            id: ArtifactId::new(),
            owner_id: OwnerId::parse("a@example.com").unwrap(),
            request_id: RequestId::new(),
            image: ImageRef::Url { url: "https://img/a.png".into() },
            report: "r".into(),
            natal_chart: None,
            astrology: AstrologyProfile::default(),
            schedule: ReleasePolicy::new(600, 24).schedule_for(t0(), notify),
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryArtifactStore>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: NotificationDispatcher,
    }

    fn fixture(batch: usize) -> Fixture {
        let clock = ManualClock::arc(t0());
        let store = InMemoryArtifactStore::arc();
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(store.clone(), notifier.clone(), clock.clone(), batch);
        Fixture {
            clock,
            store,
            notifier,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn nothing_is_sent_before_release() {
        let f = fixture(25);
        f.store.insert(&artifact(true)).await.unwrap();

        f.clock.advance(Duration::minutes(599));
        let report = f.dispatcher.sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn exactly_one_send_across_many_sweeps() {
        let f = fixture(25);
        let a = artifact(true);
        f.store.insert(&a).await.unwrap();

        f.clock.advance(Duration::minutes(601));
        for _ in 0..5 {
            f.dispatcher.sweep().await.unwrap();
            f.clock.advance(Duration::minutes(1));
        }

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, NotificationTemplate::ContentReady);
        assert_eq!(sent[0].data["imageUrl"], "https://img/a.png");
        assert_eq!(f.dispatcher.stats().sent, 1);
    }

    #[tokio::test]
    async fn failed_send_is_retried_next_sweep() {
        let f = fixture(25);
        f.store.insert(&artifact(true)).await.unwrap();
        f.notifier.fail_next(1);

        f.clock.advance(Duration::minutes(600));
        let first = f.dispatcher.sweep().await.unwrap();
        assert_eq!(first, SweepReport { due: 1, sent: 0, failed: 1 });

        let second = f.dispatcher.sweep().await.unwrap();
        assert_eq!(second, SweepReport { due: 1, sent: 1, failed: 0 });
        assert_eq!(f.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn rejected_owner_does_not_starve_later_artifacts() {
        let f = fixture(1);
        let blocked = artifact(true);
        f.store.insert(&blocked).await.unwrap();

        let mut healthy = artifact(true);
        healthy.owner_id = OwnerId::parse("b@example.com").unwrap();
        healthy.schedule = ReleasePolicy::new(600, 24).schedule_for(t0() + Duration::minutes(1), true);
        f.store.insert(&healthy).await.unwrap();

        f.notifier.reject_owner(blocked.owner_id.clone());
        f.clock.advance(Duration::hours(11));

        for _ in 0..4 {
            f.dispatcher.sweep().await.unwrap();
            f.clock.advance(Duration::minutes(1));
        }

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].owner, healthy.owner_id);
        assert!(f.store.get(healthy.id).await.unwrap().unwrap().schedule.notification_sent);
        assert!(!f.store.get(blocked.id).await.unwrap().unwrap().schedule.notification_sent);
        assert_eq!(f.store.notify_attempts(blocked.id), 3);
    }

    #[tokio::test]
    async fn unscheduled_artifacts_are_skipped_and_batch_is_bounded() {
        let f = fixture(2);
        f.store.insert(&artifact(false)).await.unwrap();
        for _ in 0..3 {
            f.store.insert(&artifact(true)).await.unwrap();
        }

        f.clock.advance(Duration::hours(11));
        assert_eq!(f.dispatcher.sweep().await.unwrap().sent, 2);
        assert_eq!(f.dispatcher.sweep().await.unwrap().sent, 1);
        assert_eq!(f.dispatcher.sweep().await.unwrap().due, 0);
        assert_eq!(f.notifier.sent().len(), 3);
    }
}
