//! Idempotency guard in front of the job queue.
//!
//! The existence check and the insert are one atomic store operation, so two
//! concurrent admissions for the same owner yield exactly one request.

use serde::Serialize;
use tracing::info;

use celestia_core::{OwnerId, RequestId};
use celestia_readings::GenerationPayload;

use super::queue::JobQueue;
use super::store::CreateOutcome;
use crate::error::StoreError;

/// Result of admitting a submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "requestId", rename_all = "camelCase")]
pub enum Admission {
    Created(RequestId),
    /// The owner already had a queued, processing or completed request.
    Existing(RequestId),
}

impl Admission {
    pub fn request_id(&self) -> RequestId {
        match self {
            Admission::Created(id) | Admission::Existing(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Admission::Created(_))
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    queue: JobQueue,
}

impl IdempotencyGuard {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Admit a submission, or return the owner's existing request.
    pub async fn admit(
        &self,
        owner: &OwnerId,
        payload: &GenerationPayload,
    ) -> Result<Admission, StoreError> {
        match self.queue.enqueue(owner, payload).await? {
            CreateOutcome::Created(id) => Ok(Admission::Created(id)),
            CreateOutcome::Existing(id) => {
                info!(request_id = %id, owner = %owner, "duplicate request; returning existing");
                Ok(Admission::Existing(id))
            }
        }
    }
}
