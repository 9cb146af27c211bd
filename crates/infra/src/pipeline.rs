//! Pipeline facade consumed by the HTTP layer.
//!
//! Intake gate -> idempotency guard -> job queue on the write side; request
//! status, artifact visibility and cached readings on the read side.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{debug, instrument};

use celestia_core::{DomainError, OwnerId, RequestId, SharedClock};
use celestia_readings::{
    ArtifactVisibility, CachedReading, IntakeError, IntakeGate, IntakeSubmission, ReadingKind,
    RequestStatusView,
};

use crate::artifacts::{ArtifactStore, InMemoryArtifactStore, PostgresArtifactStore};
use crate::cache::{InMemoryReadingCache, PostgresReadingCache, ReadingCache, ReadingError, ReadingService};
use crate::error::StoreError;
use crate::jobs::{Admission, IdempotencyGuard, InMemoryRequestStore, JobQueue, PostgresRequestStore, RequestStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reading(#[from] ReadingError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid owner identity: {0}")]
    InvalidOwner(#[from] DomainError),
}

/// The three stores backing the pipeline.
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RequestStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub readings: Arc<dyn ReadingCache>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            requests: InMemoryRequestStore::arc(),
            artifacts: InMemoryArtifactStore::arc(),
            readings: InMemoryReadingCache::arc(),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            requests: Arc::new(PostgresRequestStore::new(pool.clone())),
            artifacts: Arc::new(PostgresArtifactStore::new(pool.clone())),
            readings: Arc::new(PostgresReadingCache::new(pool)),
        }
    }
}

pub struct Pipeline {
    intake: IntakeGate,
    guard: IdempotencyGuard,
    queue: JobQueue,
    artifacts: Arc<dyn ArtifactStore>,
    readings: Arc<ReadingService>,
    clock: SharedClock,
}

impl Pipeline {
    pub fn new(stores: &Stores, readings: Arc<ReadingService>, clock: SharedClock) -> Self {
        let queue = JobQueue::new(stores.requests.clone(), clock.clone());
        Self {
            intake: IntakeGate::new(),
            guard: IdempotencyGuard::new(queue.clone()),
            queue,
            artifacts: stores.artifacts.clone(),
            readings,
            clock,
        }
    }

    /// Queue used by the poller; shares the facade's store and clock.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Validate a submission and admit it. Incomplete input never reaches the guard.
    #[instrument(skip(self, submission), err)]
    pub async fn create_request(
        &self,
        owner: &str,
        submission: IntakeSubmission,
    ) -> Result<Admission, PipelineError> {
        let (owner, payload) = self.intake.validate(owner, submission)?;
        Ok(self.guard.admit(&owner, &payload).await?)
    }

    pub async fn get_request_status(&self, id: RequestId) -> Result<RequestStatusView, PipelineError> {
        self.queue
            .get(id)
            .await?
            .map(|request| request.status_view())
            .ok_or_else(|| PipelineError::NotFound(format!("request {id}")))
    }

    /// Visibility of the owner's latest artifact. `None` until one exists.
    pub async fn get_artifact_visibility(
        &self,
        owner: &str,
    ) -> Result<Option<ArtifactVisibility>, PipelineError> {
        let owner = OwnerId::parse(owner)?;
        let Some(artifact) = self.artifacts.latest_for_owner(&owner).await? else {
            debug!(owner = %owner, "no artifact yet");
            return Ok(None);
        };
        Ok(Some(artifact.visibility(self.clock.now())))
    }

    /// Current reading of `kind`, computed from the owner's latest artifact profile.
    pub async fn reading(&self, owner: &str, kind: ReadingKind) -> Result<CachedReading, PipelineError> {
        let owner = OwnerId::parse(owner)?;
        let astrology = self.astrology_for(&owner).await?;
        Ok(self.readings.get_or_generate(&owner, kind, &astrology).await?)
    }

    /// Generate the current reading afresh, overwriting the cached one.
    pub async fn regenerate_reading(
        &self,
        owner: &str,
        kind: ReadingKind,
    ) -> Result<CachedReading, PipelineError> {
        let owner = OwnerId::parse(owner)?;
        let astrology = self.astrology_for(&owner).await?;
        Ok(self.readings.regenerate(&owner, kind, &astrology).await?)
    }

    async fn astrology_for(
        &self,
        owner: &OwnerId,
    ) -> Result<celestia_readings::AstrologyProfile, PipelineError> {
        self.artifacts
            .latest_for_owner(owner)
            .await?
            .map(|artifact| artifact.astrology)
            .ok_or_else(|| PipelineError::NotFound(format!("artifact for {owner}")))
    }
}
