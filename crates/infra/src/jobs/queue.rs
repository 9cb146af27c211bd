//! Durable FIFO queue over a [`RequestStore`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use celestia_core::{ArtifactId, OwnerId, RequestId, SharedClock};
use celestia_readings::{GenerationPayload, GenerationRequest};

use super::store::{CreateOutcome, RequestStore};
use crate::error::StoreError;

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn RequestStore>,
    clock: SharedClock,
}

impl JobQueue {
    pub fn new(store: Arc<dyn RequestStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Queue a request unless the owner already has an active one.
    pub async fn enqueue(
        &self,
        owner: &OwnerId,
        payload: &GenerationPayload,
    ) -> Result<CreateOutcome, StoreError> {
        let outcome = self
            .store
            .create_if_absent(owner, payload, self.clock.now())
            .await?;
        if let CreateOutcome::Created(id) = outcome {
            info!(request_id = %id, owner = %owner, "generation request queued");
        }
        Ok(outcome)
    }

    /// Claim the oldest queued request. Two callers never get the same one.
    pub async fn claim_next(&self) -> Result<Option<GenerationRequest>, StoreError> {
        let claimed = self.store.claim_next(self.clock.now()).await?;
        match &claimed {
            Some(request) => debug!(request_id = %request.id, owner = %request.owner_id, "request claimed"),
            None => debug!("no queued requests"),
        }
        Ok(claimed)
    }

    pub async fn complete(&self, id: RequestId, artifact_id: ArtifactId) -> Result<(), StoreError> {
        self.store.complete(id, artifact_id, self.clock.now()).await?;
        info!(request_id = %id, artifact_id = %artifact_id, "request completed");
        Ok(())
    }

    /// Mark the request failed. Failed requests are never retried.
    pub async fn fail(&self, id: RequestId, error: &str) -> Result<(), StoreError> {
        self.store.fail(id, error, self.clock.now()).await?;
        warn!(request_id = %id, error = %error, "request failed");
        Ok(())
    }

    pub async fn get(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
        self.store.get(id).await
    }
}
