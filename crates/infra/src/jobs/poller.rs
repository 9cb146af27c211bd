//! Poller: claims one queued request per tick and runs the worker on it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use celestia_core::RequestId;

use super::queue::JobQueue;
use crate::error::StoreError;
use crate::scheduler::PeriodicTask;
use crate::worker::GenerationWorker;

/// Poller statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStats {
    pub ticks: u64,
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Completed(RequestId),
    Failed(RequestId),
}

pub struct GenerationPoller {
    queue: JobQueue,
    worker: Arc<GenerationWorker>,
    stats: Mutex<PollerStats>,
}

impl GenerationPoller {
    pub fn new(queue: JobQueue, worker: Arc<GenerationWorker>) -> Self {
        Self {
            queue,
            worker,
            stats: Mutex::new(PollerStats::default()),
        }
    }

    pub fn stats(&self) -> PollerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Process at most one queued request.
    ///
    /// Worker errors mark the request failed and are not returned. So does a
    /// store error while recording completion, so the owner is not locked out
    /// by a request stuck in processing. Only errors that leave the request
    /// unrecorded escape.
    pub async fn run_once(&self) -> Result<PollOutcome, StoreError> {
        self.record(|s| s.ticks += 1);

        let Some(request) = self.queue.claim_next().await? else {
            return Ok(PollOutcome::Idle);
        };
        self.record(|s| s.processed += 1);

        let failure = match self.worker.process(&request).await {
            Ok(artifact_id) => match self.queue.complete(request.id, artifact_id).await {
                Ok(()) => {
                    self.record(|s| s.completed += 1);
                    return Ok(PollOutcome::Completed(request.id));
                }
                Err(e) => {
                    error!(request_id = %request.id, artifact_id = %artifact_id, error = %e, "failed to record completion");
                    format!("failed to record completion: {e}")
                }
            },
            Err(e) => {
                error!(request_id = %request.id, owner = %request.owner_id, error = %e, "generation failed");
                e.to_string()
            }
        };

        self.queue.fail(request.id, &failure).await?;
        self.record(|s| s.failed += 1);
        Ok(PollOutcome::Failed(request.id))
    }

    fn record(&self, apply: impl FnOnce(&mut PollerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            apply(&mut stats);
        }
    }
}

#[async_trait]
impl PeriodicTask for GenerationPoller {
    fn name(&self) -> &'static str {
        "generation-poller"
    }

    async fn tick(&self) -> Result<(), StoreError> {
        if let PollOutcome::Completed(id) = self.run_once().await? {
            info!(request_id = %id, "poll tick completed a request");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::jobs::{CreateOutcome, InMemoryRequestStore, RequestStore};
    use crate::worker::WorkerSettings;
    use celestia_ai::MockGenerator;
    use celestia_core::{ArtifactId, ManualClock, OwnerId};
    use celestia_readings::{BirthDetails, GenerationPayload, GenerationRequest, RequestStatus};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    /// Delegates to an in-memory store, but `complete` can be made to fail once.
    #[derive(Default)]
    struct FlakyCompleteStore {
        inner: InMemoryRequestStore,
        fail_complete: AtomicBool,
    }

    #[async_trait]
    impl RequestStore for FlakyCompleteStore {
        async fn create_if_absent(
            &self,
            owner: &OwnerId,
            payload: &GenerationPayload,
            now: DateTime<Utc>,
        ) -> Result<CreateOutcome, StoreError> {
            self.inner.create_if_absent(owner, payload, now).await
        }

        async fn get(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
            self.inner.get(id).await
        }

        async fn find_active(&self, owner: &OwnerId) -> Result<Option<GenerationRequest>, StoreError> {
            self.inner.find_active(owner).await
        }

        async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<GenerationRequest>, StoreError> {
            self.inner.claim_next(now).await
        }

        async fn complete(
            &self,
            id: RequestId,
            artifact_id: ArtifactId,
            now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            if self.fail_complete.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.complete(id, artifact_id, now).await
        }

        async fn fail(&self, id: RequestId, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.fail(id, error, now).await
        }
    }

    fn payload(answers: serde_json::Value) -> GenerationPayload {
        GenerationPayload {
            answers: answers.as_object().cloned().unwrap(),
            birth_details: BirthDetails {
                date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
                time: None,
                city: None,
            },
        }
    }

    struct Fixture {
        queue: JobQueue,
        artifacts: Arc<InMemoryArtifactStore>,
        poller: GenerationPoller,
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryRequestStore::arc())
    }

    fn fixture_with(store: Arc<dyn RequestStore>) -> Fixture {
        let clock = ManualClock::arc(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let queue = JobQueue::new(store, clock.clone());
        let artifacts = InMemoryArtifactStore::arc();
        let generator = Arc::new(MockGenerator::new());
        let worker = GenerationWorker::new(
            generator.clone(),
            generator,
            artifacts.clone(),
            clock,
            WorkerSettings::default(),
        );
        let poller = GenerationPoller::new(queue.clone(), Arc::new(worker));
        Fixture {
            queue,
            artifacts,
            poller,
        }
    }

    #[tokio::test]
    async fn idle_tick_only_counts() {
        let f = fixture();
        assert_eq!(f.poller.run_once().await.unwrap(), PollOutcome::Idle);
        let stats = f.poller.stats();
        assert_eq!((stats.ticks, stats.processed), (1, 0));
    }

    #[tokio::test]
    async fn completes_request_with_artifact_link() {
        let f = fixture();
        let owner = OwnerId::parse("ok@example.com").unwrap();
        let id = f
            .queue
            .enqueue(&owner, &payload(serde_json::json!({"gender": "Female"})))
            .await
            .unwrap()
            .request_id();

        assert_eq!(f.poller.run_once().await.unwrap(), PollOutcome::Completed(id));

        let request = f.queue.get(id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Completed);
        let artifact = f.artifacts.latest_for_owner(&owner).await.unwrap().unwrap();
        assert_eq!(request.artifact_id, Some(artifact.id));
        assert_eq!(f.poller.stats().completed, 1);
    }

    #[tokio::test]
    async fn worker_error_marks_request_failed() {
        let f = fixture();
        let owner = OwnerId::parse("empty@example.com").unwrap();
        let id = f
            .queue
            .enqueue(&owner, &payload(serde_json::json!({})))
            .await
            .unwrap()
            .request_id();

        assert_eq!(f.poller.run_once().await.unwrap(), PollOutcome::Failed(id));

        let request = f.queue.get(id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Failed);
        assert!(request.error.unwrap().starts_with("input incomplete"));
        assert!(f.artifacts.is_empty());
        assert_eq!(f.poller.stats().failed, 1);
    }

    #[tokio::test]
    async fn unrecorded_completion_fails_request_and_frees_owner() {
        let store = Arc::new(FlakyCompleteStore::default());
        store.fail_complete.store(true, Ordering::SeqCst);
        let f = fixture_with(store);
        let owner = OwnerId::parse("flaky@example.com").unwrap();
        let body = payload(serde_json::json!({"gender": "Male"}));
        let id = f.queue.enqueue(&owner, &body).await.unwrap().request_id();

        assert_eq!(f.poller.run_once().await.unwrap(), PollOutcome::Failed(id));

        let request = f.queue.get(id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Failed);
        assert!(request.error.unwrap().starts_with("failed to record completion"));
        assert_eq!(f.poller.stats().failed, 1);

        let retry = f.queue.enqueue(&owner, &body).await.unwrap();
        assert!(matches!(retry, CreateOutcome::Created(new_id) if new_id != id));
    }
}
