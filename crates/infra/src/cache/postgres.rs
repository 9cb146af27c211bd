//! Postgres-backed reading cache. Primary key `(owner_id, kind, period_key)`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use celestia_core::OwnerId;
use celestia_readings::{CachedReading, PeriodKey, ReadingKind, ReadingScores};

use super::store::ReadingCache;
use crate::db::{decode_error, map_sqlx_error};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct PostgresReadingCache {
    pool: Arc<PgPool>,
}

impl PostgresReadingCache {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ReadingCache for PostgresReadingCache {
    #[instrument(skip(self), fields(owner = %owner, kind = %kind, period = %period), err)]
    async fn get(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        period: &PeriodKey,
    ) -> Result<Option<CachedReading>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT owner_id, kind, period_key, content, emotion_score, energy_score, created_at
            FROM cached_readings
            WHERE owner_id = $1 AND kind = $2 AND period_key = $3
            "#,
        )
        .bind(owner.as_str())
        .bind(kind.as_str())
        .bind(period.to_string())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_reading", e))?;

        row.map(|row| {
            CachedReadingRow::from_row(&row)
                .map_err(|e| decode_error("reading", e))?
                .try_into()
        })
        .transpose()
    }

    #[instrument(
        skip(self, reading),
        fields(owner = %reading.owner_id, kind = %reading.kind, period = %reading.period_key),
        err
    )]
    async fn put(&self, reading: &CachedReading) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cached_readings
                (owner_id, kind, period_key, content, emotion_score, energy_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (owner_id, kind, period_key) DO UPDATE SET
                content = EXCLUDED.content,
                emotion_score = EXCLUDED.emotion_score,
                energy_score = EXCLUDED.energy_score,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(reading.owner_id.as_str())
        .bind(reading.kind.as_str())
        .bind(reading.period_key.to_string())
        .bind(&reading.content)
        .bind(reading.scores.emotion.map(i16::from))
        .bind(reading.scores.energy.map(i16::from))
        .bind(reading.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put_reading", e))?;

        Ok(())
    }
}

#[derive(Debug)]
struct CachedReadingRow {
    owner_id: String,
    kind: String,
    period_key: String,
    content: String,
    emotion_score: Option<i16>,
    energy_score: Option<i16>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for CachedReadingRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(CachedReadingRow {
            owner_id: row.try_get("owner_id")?,
            kind: row.try_get("kind")?,
            period_key: row.try_get("period_key")?,
            content: row.try_get("content")?,
            emotion_score: row.try_get("emotion_score")?,
            energy_score: row.try_get("energy_score")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<CachedReadingRow> for CachedReading {
    type Error = StoreError;

    fn try_from(row: CachedReadingRow) -> Result<Self, Self::Error> {
        let score = |v: Option<i16>| {
            v.map(|s| u8::try_from(s).map_err(|e| decode_error("reading", e)))
                .transpose()
        };
        Ok(CachedReading {
            owner_id: OwnerId::parse(&row.owner_id).map_err(|e| decode_error("reading", e))?,
            kind: row.kind.parse().map_err(|e| decode_error("reading", e))?,
            period_key: PeriodKey::parse(&row.period_key).map_err(|e| decode_error("reading", e))?,
            content: row.content,
            scores: ReadingScores {
                emotion: score(row.emotion_score)?,
                energy: score(row.energy_score)?,
            },
            created_at: row.created_at,
        })
    }
}
