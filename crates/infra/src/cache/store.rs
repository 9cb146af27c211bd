use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use celestia_core::OwnerId;
use celestia_readings::{CachedReading, PeriodKey, ReadingKind};

use crate::error::StoreError;

/// Date-scoped reading cache. Entries never expire; `put` upserts.
#[async_trait]
pub trait ReadingCache: Send + Sync + 'static {
    async fn get(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        period: &PeriodKey,
    ) -> Result<Option<CachedReading>, StoreError>;

    async fn put(&self, reading: &CachedReading) -> Result<(), StoreError>;
}

type CacheKey = (OwnerId, ReadingKind, PeriodKey);

/// In-memory reading cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReadingCache {
    entries: RwLock<HashMap<CacheKey, CachedReading>>,
}

impl InMemoryReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingCache for InMemoryReadingCache {
    async fn get(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        period: &PeriodKey,
    ) -> Result<Option<CachedReading>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::poisoned("reading cache"))?;
        Ok(entries.get(&(owner.clone(), kind, *period)).cloned())
    }

    async fn put(&self, reading: &CachedReading) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::poisoned("reading cache"))?;
        entries.insert(
            (reading.owner_id.clone(), reading.kind, reading.period_key),
            reading.clone(),
        );
        Ok(())
    }
}
