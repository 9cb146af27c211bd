//! Postgres-backed artifact store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use celestia_core::{ArtifactId, OwnerId, RequestId};
use celestia_readings::{GeneratedArtifact, ReleaseSchedule};

use super::store::ArtifactStore;
use crate::db::{decode_error, map_sqlx_error};
use crate::error::StoreError;

const SELECT_COLUMNS: &str = "id, owner_id, request_id, image, report, natal_chart, astrology, \
     generated_at, release_at, release_delay_minutes, promised_window_hours, \
     notification_sent, notification_scheduled, notified_at";

#[derive(Debug, Clone)]
pub struct PostgresArtifactStore {
    pool: Arc<PgPool>,
}

impl PostgresArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ArtifactStore for PostgresArtifactStore {
    #[instrument(skip(self, artifact), fields(artifact_id = %artifact.id, request_id = %artifact.request_id), err)]
    async fn insert(&self, artifact: &GeneratedArtifact) -> Result<(), StoreError> {
        let image = serde_json::to_value(&artifact.image)
            .map_err(|e| StoreError::Decode(format!("image: {e}")))?;
        let astrology = serde_json::to_value(&artifact.astrology)
            .map_err(|e| StoreError::Decode(format!("astrology: {e}")))?;
        let schedule = &artifact.schedule;
        let release_delay_minutes = column_int("release_delay_minutes", schedule.release_delay_minutes)?;
        let promised_window_hours = column_int("promised_window_hours", schedule.promised_window_hours)?;

        sqlx::query(
            r#"
            INSERT INTO generated_artifacts (
                id, owner_id, request_id, image, report, natal_chart, astrology,
                generated_at, release_at, release_delay_minutes, promised_window_hours,
                notification_sent, notification_scheduled, notified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(artifact.id.as_uuid())
        .bind(artifact.owner_id.as_str())
        .bind(artifact.request_id.as_uuid())
        .bind(&image)
        .bind(&artifact.report)
        .bind(&artifact.natal_chart)
        .bind(&astrology)
        .bind(schedule.generated_at)
        .bind(schedule.release_at)
        .bind(release_delay_minutes)
        .bind(promised_window_hours)
        .bind(schedule.notification_sent)
        .bind(schedule.notification_scheduled)
        .bind(schedule.notified_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_artifact", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(artifact_id = %id), err)]
    async fn get(&self, id: ArtifactId) -> Result<Option<GeneratedArtifact>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM generated_artifacts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_artifact", e))?;

        row.map(|row| decode_artifact(&row)).transpose()
    }

    #[instrument(skip(self), fields(owner = %owner), err)]
    async fn latest_for_owner(&self, owner: &OwnerId) -> Result<Option<GeneratedArtifact>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM generated_artifacts \
             WHERE owner_id = $1 ORDER BY generated_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(owner.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_artifact_for_owner", e))?;

        row.map(|row| decode_artifact(&row)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn due_for_notification(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GeneratedArtifact>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM generated_artifacts \
             WHERE notification_sent = FALSE AND notification_scheduled = TRUE AND release_at <= $1 \
             ORDER BY last_notify_attempt_at ASC NULLS FIRST, release_at ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("due_for_notification", e))?;

        rows.iter().map(decode_artifact).collect()
    }

    #[instrument(skip(self), fields(artifact_id = %id), err)]
    async fn mark_notified(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generated_artifacts
            SET notification_sent = TRUE, notified_at = $2
            WHERE id = $1 AND notification_sent = FALSE AND release_at <= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_notified", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(artifact_id = %id), err)]
    async fn record_notify_failure(&self, id: ArtifactId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generated_artifacts
            SET notify_attempts = notify_attempts + 1, last_notify_attempt_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_notify_failure", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("artifact {id}")));
        }
        Ok(())
    }
}

/// `u32` schedule field as a Postgres `INTEGER`.
fn column_int(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} {value} exceeds INTEGER range")))
}

#[derive(Debug)]
struct ArtifactRow {
    id: Uuid,
    owner_id: String,
    request_id: Uuid,
    image: serde_json::Value,
    report: String,
    natal_chart: Option<String>,
    astrology: serde_json::Value,
    generated_at: DateTime<Utc>,
    release_at: DateTime<Utc>,
    release_delay_minutes: i32,
    promised_window_hours: i32,
    notification_sent: bool,
    notification_scheduled: bool,
    notified_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ArtifactRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ArtifactRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            request_id: row.try_get("request_id")?,
            image: row.try_get("image")?,
            report: row.try_get("report")?,
            natal_chart: row.try_get("natal_chart")?,
            astrology: row.try_get("astrology")?,
            generated_at: row.try_get("generated_at")?,
            release_at: row.try_get("release_at")?,
            release_delay_minutes: row.try_get("release_delay_minutes")?,
            promised_window_hours: row.try_get("promised_window_hours")?,
            notification_sent: row.try_get("notification_sent")?,
            notification_scheduled: row.try_get("notification_scheduled")?,
            notified_at: row.try_get("notified_at")?,
        })
    }
}

impl TryFrom<ArtifactRow> for GeneratedArtifact {
    type Error = StoreError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        let non_negative = |v: i32| u32::try_from(v).map_err(|e| decode_error("artifact", e));
        Ok(GeneratedArtifact {
            id: ArtifactId::from_uuid(row.id),
            owner_id: OwnerId::parse(&row.owner_id).map_err(|e| decode_error("artifact", e))?,
            request_id: RequestId::from_uuid(row.request_id),
            image: serde_json::from_value(row.image).map_err(|e| decode_error("artifact", e))?,
            report: row.report,
            natal_chart: row.natal_chart,
            astrology: serde_json::from_value(row.astrology)
                .map_err(|e| decode_error("artifact", e))?,
            schedule: ReleaseSchedule {
                generated_at: row.generated_at,
                release_at: row.release_at,
                release_delay_minutes: non_negative(row.release_delay_minutes)?,
                promised_window_hours: non_negative(row.promised_window_hours)?,
                notification_sent: row.notification_sent,
                notification_scheduled: row.notification_scheduled,
                notified_at: row.notified_at,
            },
        })
    }
}

fn decode_artifact(row: &sqlx::postgres::PgRow) -> Result<GeneratedArtifact, StoreError> {
    ArtifactRow::from_row(row)
        .map_err(|e| decode_error("artifact", e))?
        .try_into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_fields_must_fit_integer_column() {
        assert_eq!(column_int("release_delay_minutes", 600).unwrap(), 600);
        assert_eq!(column_int("promised_window_hours", i32::MAX as u32).unwrap(), i32::MAX);

        let err = column_int("release_delay_minutes", u32::MAX).unwrap_err();
        assert!(matches!(err, StoreError::Decode(ref msg) if msg.contains("release_delay_minutes")));
    }
}
