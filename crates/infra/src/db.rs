//! Postgres connection, schema bootstrap and error mapping.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `InvalidTransition` |
//! | Database (other) | Any other | `Database` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Decode` |
//! | RowNotFound | N/A | `NotFound` |

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::error::StoreError;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Apply the bundled schema. Every statement is idempotent.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    info!("database schema ensured");
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23514") => StoreError::InvalidTransition(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("i/o error in {}: {}", operation, e)),
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {}", operation)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

pub(crate) fn decode_error(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(format!("failed to decode {what} row: {err}"))
}
