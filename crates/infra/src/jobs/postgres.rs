//! Postgres-backed request store.
//!
//! Atomicity comes from the database alone:
//! - the partial unique index `generation_requests_active_owner` makes
//!   "one non-failed request per owner" hold under concurrent inserts;
//! - `claim_next` is one `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED)`,
//!   so two pollers never claim the same row;
//! - `complete`/`fail` are conditional on the current status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use celestia_core::{ArtifactId, OwnerId, RequestId};
use celestia_readings::{GenerationPayload, GenerationRequest, RequestStatus};
use celestia_readings::request::truncate_error;

use super::store::{CreateOutcome, RequestStore};
use crate::db::{decode_error, map_sqlx_error};
use crate::error::StoreError;

/// Attempts at resolving an insert conflict whose blocking row failed in between.
const CREATE_ATTEMPTS: usize = 3;

const SELECT_COLUMNS: &str =
    "id, owner_id, status, payload, created_at, updated_at, artifact_id, error";

#[derive(Debug, Clone)]
pub struct PostgresRequestStore {
    pool: Arc<PgPool>,
}

impl PostgresRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Explain why a conditional update touched no row.
    async fn transition_failure(&self, id: RequestId, attempted: &str) -> StoreError {
        match self.get(id).await {
            Ok(Some(current)) => StoreError::InvalidTransition(format!(
                "request {id} cannot {attempted} from {}",
                current.status
            )),
            Ok(None) => StoreError::NotFound(format!("request {id}")),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    #[instrument(skip(self, payload), fields(owner = %owner), err)]
    async fn create_if_absent(
        &self,
        owner: &OwnerId,
        payload: &GenerationPayload,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| StoreError::Decode(format!("payload: {e}")))?;

        for attempt in 1..=CREATE_ATTEMPTS {
            let id = RequestId::new();
            let inserted = sqlx::query(
                r#"
                INSERT INTO generation_requests (id, owner_id, status, payload, created_at, updated_at)
                VALUES ($1, $2, 'queued', $3, $4, $4)
                ON CONFLICT (owner_id) WHERE status <> 'failed' DO NOTHING
                RETURNING id
                "#,
            )
            .bind(id.as_uuid())
            .bind(owner.as_str())
            .bind(&payload)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_request", e))?;

            if inserted.is_some() {
                return Ok(CreateOutcome::Created(id));
            }

            if let Some(existing) = self.find_active(owner).await? {
                return Ok(CreateOutcome::Existing(existing.id));
            }
            debug!(attempt, "blocking request disappeared before lookup; retrying insert");
        }

        Err(StoreError::Conflict(format!(
            "could not create or find an active request for {owner}"
        )))
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn get(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM generation_requests WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_request", e))?;

        row.map(|row| decode_request(&row)).transpose()
    }

    #[instrument(skip(self), fields(owner = %owner), err)]
    async fn find_active(&self, owner: &OwnerId) -> Result<Option<GenerationRequest>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM generation_requests WHERE owner_id = $1 AND status <> 'failed'"
        );
        let row = sqlx::query(&sql)
            .bind(owner.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_active_request", e))?;

        row.map(|row| decode_request(&row)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<GenerationRequest>, StoreError> {
        let sql = format!(
            r#"
            UPDATE generation_requests
            SET status = 'processing', updated_at = $1
            WHERE id = (
                SELECT id FROM generation_requests
                WHERE status = 'queued'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'queued'
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_next", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        match decode_request(&row) {
            Ok(request) => Ok(Some(request)),
            Err(e) => {
                // The row is already processing; fail it so it does not sit there forever.
                if let Ok(id) = row.try_get::<Uuid, _>("id") {
                    let id = RequestId::from_uuid(id);
                    warn!(request_id = %id, error = %e, "claimed request could not be decoded");
                    if let Err(fail_err) = self.fail(id, &format!("undecodable request: {e}"), now).await {
                        warn!(request_id = %id, error = %fail_err, "failed to mark undecodable request failed");
                    }
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(request_id = %id, artifact_id = %artifact_id), err)]
    async fn complete(
        &self,
        id: RequestId,
        artifact_id: ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'completed', artifact_id = $2, error = NULL, updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.as_uuid())
        .bind(artifact_id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete_request", e))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id, "complete").await);
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(request_id = %id), err)]
    async fn fail(&self, id: RequestId, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_requests
            SET status = 'failed', error = $2, updated_at = $3
            WHERE id = $1 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(id.as_uuid())
        .bind(truncate_error(error))
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fail_request", e))?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id, "fail").await);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct GenerationRequestRow {
    id: Uuid,
    owner_id: String,
    status: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    artifact_id: Option<Uuid>,
    error: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for GenerationRequestRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(GenerationRequestRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            status: row.try_get("status")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            artifact_id: row.try_get("artifact_id")?,
            error: row.try_get("error")?,
        })
    }
}

impl TryFrom<GenerationRequestRow> for GenerationRequest {
    type Error = StoreError;

    fn try_from(row: GenerationRequestRow) -> Result<Self, Self::Error> {
        Ok(GenerationRequest {
            id: RequestId::from_uuid(row.id),
            owner_id: OwnerId::parse(&row.owner_id).map_err(|e| decode_error("request", e))?,
            status: row
                .status
                .parse::<RequestStatus>()
                .map_err(|e| decode_error("request", e))?,
            payload: serde_json::from_value(row.payload).map_err(|e| decode_error("request", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            artifact_id: row.artifact_id.map(ArtifactId::from_uuid),
            error: row.error,
        })
    }
}

fn decode_request(row: &sqlx::postgres::PgRow) -> Result<GenerationRequest, StoreError> {
    GenerationRequestRow::from_row(row)
        .map_err(|e| decode_error("request", e))?
        .try_into()
}
