use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use celestia_core::{ArtifactId, OwnerId};
use celestia_readings::GeneratedArtifact;

use crate::error::StoreError;

/// Artifact store abstraction.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn insert(&self, artifact: &GeneratedArtifact) -> Result<(), StoreError>;

    async fn get(&self, id: ArtifactId) -> Result<Option<GeneratedArtifact>, StoreError>;

    /// Most recently generated artifact of an owner.
    async fn latest_for_owner(&self, owner: &OwnerId) -> Result<Option<GeneratedArtifact>, StoreError>;

    /// Released, scheduled and not yet notified.
    ///
    /// Never-attempted artifacts come first (oldest release first), then
    /// previously failed ones by oldest attempt, so a failing owner cannot
    /// starve the rest of the batch.
    async fn due_for_notification(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GeneratedArtifact>, StoreError>;

    /// Conditional false -> true flip of `notification_sent`.
    ///
    /// Returns `false` when the flag was already set or the artifact is not
    /// yet released; nothing is changed in that case.
    async fn mark_notified(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Record a failed delivery attempt; pushes the artifact behind untried ones.
    async fn record_notify_failure(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Delivery bookkeeping for an artifact whose notification failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct NotifyAttempts {
    count: u32,
    last_at: DateTime<Utc>,
}

/// In-memory artifact store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<ArtifactId, GeneratedArtifact>>,
    attempts: RwLock<HashMap<ArtifactId, NotifyAttempts>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failed notification attempts recorded for an artifact.
    pub fn notify_attempts(&self, id: ArtifactId) -> u32 {
        self.attempts
            .read()
            .map(|a| a.get(&id).map_or(0, |n| n.count))
            .unwrap_or(0)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn insert(&self, artifact: &GeneratedArtifact) -> Result<(), StoreError> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        if artifacts.contains_key(&artifact.id) {
            return Err(StoreError::Conflict(format!("artifact {} already exists", artifact.id)));
        }
        if artifacts.values().any(|a| a.request_id == artifact.request_id) {
            return Err(StoreError::Conflict(format!(
                "request {} already has an artifact",
                artifact.request_id
            )));
        }
        artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get(&self, id: ArtifactId) -> Result<Option<GeneratedArtifact>, StoreError> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        Ok(artifacts.get(&id).cloned())
    }

    async fn latest_for_owner(&self, owner: &OwnerId) -> Result<Option<GeneratedArtifact>, StoreError> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        Ok(artifacts
            .values()
            .filter(|a| &a.owner_id == owner)
            .max_by_key(|a| (a.schedule.generated_at, a.id))
            .cloned())
    }

    async fn due_for_notification(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GeneratedArtifact>, StoreError> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        let attempts = self
            .attempts
            .read()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        let mut due: Vec<_> = artifacts
            .values()
            .filter(|a| a.schedule.is_notification_due(now))
            .collect();
        // `None` sorts before `Some`: untried artifacts lead.
        due.sort_by_key(|a| {
            (
                attempts.get(&a.id).map(|n| n.last_at),
                a.schedule.release_at,
                a.id,
            )
        });
        Ok(due.into_iter().take(limit).cloned().collect())
    }

    async fn mark_notified(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        let artifact = artifacts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("artifact {id}")))?;
        Ok(artifact.schedule.mark_notified(now).is_ok())
    }

    async fn record_notify_failure(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<(), StoreError> {
        if !self
            .artifacts
            .read()
            .map_err(|_| StoreError::poisoned("artifact store"))?
            .contains_key(&id)
        {
            return Err(StoreError::NotFound(format!("artifact {id}")));
        }
        let mut attempts = self
            .attempts
            .write()
            .map_err(|_| StoreError::poisoned("artifact store"))?;
        let entry = attempts.entry(id).or_insert(NotifyAttempts {
            count: 0,
            last_at: now,
        });
        entry.count += 1;
        entry.last_at = now;
        Ok(())
    }
}
