//! Request storage: the durable side of the job queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use celestia_core::{ArtifactId, OwnerId, RequestId};
use celestia_readings::{GenerationPayload, GenerationRequest, RequestStatus};

use crate::error::StoreError;

/// Result of an atomic "create unless an active request exists".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(RequestId),
    /// A non-failed request already existed for the owner.
    Existing(RequestId),
}

impl CreateOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            CreateOutcome::Created(id) | CreateOutcome::Existing(id) => *id,
        }
    }
}

/// Request store abstraction.
///
/// Every mutation is a single conditional operation: implementations must not
/// split a check and its write across two round trips.
#[async_trait]
pub trait RequestStore: Send + Sync + 'static {
    /// Insert a queued request unless the owner already has a non-failed one.
    async fn create_if_absent(
        &self,
        owner: &OwnerId,
        payload: &GenerationPayload,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError>;

    async fn get(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError>;

    /// The owner's non-failed request, if any.
    async fn find_active(&self, owner: &OwnerId) -> Result<Option<GenerationRequest>, StoreError>;

    /// Flip the oldest queued request to processing and return it.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<GenerationRequest>, StoreError>;

    /// processing -> completed.
    async fn complete(
        &self,
        id: RequestId,
        artifact_id: ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// queued|processing -> failed. The error text is truncated.
    async fn fail(&self, id: RequestId, error: &str, now: DateTime<Utc>) -> Result<(), StoreError>;
}

/// In-memory request store for tests/dev.
///
/// A single mutex guards the whole table so check-and-insert is atomic.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: Mutex<HashMap<RequestId, GenerationRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored requests for an owner, any status.
    pub fn count_for_owner(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        let requests = self.lock()?;
        Ok(requests.values().filter(|r| &r.owner_id == owner).count())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RequestId, GenerationRequest>>, StoreError> {
        self.requests.lock().map_err(|_| StoreError::poisoned("request store"))
    }

    fn update<F>(&self, id: RequestId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut GenerationRequest) -> Result<(), celestia_core::DomainError>,
    {
        let mut requests = self.lock()?;
        let request = requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;
        // Apply to a copy so a rejected transition leaves the row untouched.
        let mut updated = request.clone();
        apply(&mut updated)?;
        *request = updated;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create_if_absent(
        &self,
        owner: &OwnerId,
        payload: &GenerationPayload,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        let mut requests = self.lock()?;
        if let Some(existing) = requests
            .values()
            .find(|r| &r.owner_id == owner && r.status.is_active())
        {
            return Ok(CreateOutcome::Existing(existing.id));
        }

        let request = GenerationRequest::new(owner.clone(), payload.clone(), now);
        let id = request.id;
        requests.insert(id, request);
        Ok(CreateOutcome::Created(id))
    }

    async fn get(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_active(&self, owner: &OwnerId) -> Result<Option<GenerationRequest>, StoreError> {
        let requests = self.lock()?;
        Ok(requests
            .values()
            .find(|r| &r.owner_id == owner && r.status.is_active())
            .cloned())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<GenerationRequest>, StoreError> {
        let mut requests = self.lock()?;

        // Oldest first; the v7 id breaks ties between equal timestamps.
        let next = requests
            .values()
            .filter(|r| r.status == RequestStatus::Queued)
            .min_by_key(|r| (r.created_at, r.id))
            .map(|r| r.id);

        match next.and_then(|id| requests.get_mut(&id)) {
            Some(request) => {
                request.mark_processing(now)?;
                Ok(Some(request.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(
        &self,
        id: RequestId,
        artifact_id: ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(id, |r| r.mark_completed(artifact_id, now))
    }

    async fn fail(&self, id: RequestId, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(id, |r| r.mark_failed(error, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestia_readings::BirthDetails;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn owner(name: &str) -> OwnerId {
        OwnerId::parse(&format!("{name}@example.com")).unwrap()
    }

    fn payload() -> GenerationPayload {
        let mut answers = serde_json::Map::new();
        answers.insert("gender".into(), serde_json::json!("Female"));
        GenerationPayload {
            answers,
            birth_details: BirthDetails {
                date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
                time: None,
                city: None,
            },
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn second_create_returns_existing() {
        let store = InMemoryRequestStore::new();
        let first = store.create_if_absent(&owner("a"), &payload(), t0()).await.unwrap();
        let second = store.create_if_absent(&owner("a"), &payload(), t0()).await.unwrap();

        assert!(matches!(first, CreateOutcome::Created(_)));
        assert_eq!(second, CreateOutcome::Existing(first.request_id()));
        assert_eq!(store.count_for_owner(&owner("a")).unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_request_does_not_block_a_new_one() {
        let store = InMemoryRequestStore::new();
        let first = store.create_if_absent(&owner("a"), &payload(), t0()).await.unwrap();
        store.fail(first.request_id(), "boom", t0()).await.unwrap();

        let second = store.create_if_absent(&owner("a"), &payload(), t0()).await.unwrap();
        assert!(matches!(second, CreateOutcome::Created(id) if id != first.request_id()));
    }

    #[tokio::test]
    async fn claim_is_fifo_and_single() {
        let store = InMemoryRequestStore::new();
        let a = store.create_if_absent(&owner("a"), &payload(), t0()).await.unwrap();
        let b = store
            .create_if_absent(&owner("b"), &payload(), t0() + Duration::seconds(1))
            .await
            .unwrap();

        let first = store.claim_next(t0()).await.unwrap().unwrap();
        let second = store.claim_next(t0()).await.unwrap().unwrap();
        assert_eq!(first.id, a.request_id());
        assert_eq!(second.id, b.request_id());
        assert_eq!(first.status, RequestStatus::Processing);
        assert!(store.claim_next(t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_requires_processing() {
        let store = InMemoryRequestStore::new();
        let id = store
            .create_if_absent(&owner("a"), &payload(), t0())
            .await
            .unwrap()
            .request_id();

        let err = store.complete(id, ArtifactId::new(), t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(store.get(id).await.unwrap().unwrap().status, RequestStatus::Queued);

        store.claim_next(t0()).await.unwrap();
        store.complete(id, ArtifactId::new(), t0()).await.unwrap();
        assert!(matches!(
            store.fail(id, "late", t0()).await,
            Err(StoreError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let store = InMemoryRequestStore::new();
        assert!(matches!(
            store.fail(RequestId::new(), "x", t0()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
