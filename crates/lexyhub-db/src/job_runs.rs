//! Database operations for the `job_runs` ledger.

use chrono::{DateTime, Utc};
use lexyhub_core::JobStatus;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `job_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub job_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// The schema defines this as `INTEGER NOT NULL DEFAULT 0`.
    pub records_processed: i32,
    pub metadata: Value,
}

const JOB_RUN_COLUMNS: &str =
    "id, public_id, job_name, status, started_at, finished_at, records_processed, metadata";

/// Opens a run in `running` status and returns its `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_job_run(pool: &PgPool, job_name: &str) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO job_runs (public_id, job_name, status) \
         VALUES ($1, $2, 'running') \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(job_name)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Records a run that was never started because its gate was closed.
///
/// The row is written directly in `skipped` with `metadata.reason`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_skipped_job_run(
    pool: &PgPool,
    job_name: &str,
    reason: &str,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO job_runs (public_id, job_name, status, finished_at, metadata) \
         VALUES ($1, $2, 'skipped', NOW(), jsonb_build_object('reason', $3::TEXT)) \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(job_name)
    .bind(reason)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Moves a `running` run to a terminal `status`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobRunTransition`] if the run is not currently
/// `running` (already finalized, or `status` is itself `running`), or
/// [`DbError::Sqlx`] if the update fails.
pub async fn finalize_job_run(
    pool: &PgPool,
    id: i64,
    status: JobStatus,
    records_processed: i32,
    metadata: &Value,
) -> Result<(), DbError> {
    if !status.is_terminal() {
        return Err(DbError::InvalidJobRunTransition {
            id,
            expected_status: "running",
        });
    }

    let result = sqlx::query(
        "UPDATE job_runs \
         SET status = $1, finished_at = NOW(), records_processed = $2, metadata = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(status.as_str())
    .bind(records_processed)
    .bind(metadata)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_job_run(pool: &PgPool, id: i64) -> Result<JobRunRow, DbError> {
    let sql = format!("SELECT {JOB_RUN_COLUMNS} FROM job_runs WHERE id = $1");

    let row = sqlx::query_as::<_, JobRunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_runs(pool: &PgPool, limit: i64) -> Result<Vec<JobRunRow>, DbError> {
    let sql = format!(
        "SELECT {JOB_RUN_COLUMNS} FROM job_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT $1"
    );

    let rows = sqlx::query_as::<_, JobRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Marks every run still `running` that started before `older_than` as
/// `failed`, and returns the ids it touched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reap_stale_job_runs(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "UPDATE job_runs \
         SET status = 'failed', finished_at = NOW(), \
             metadata = metadata || jsonb_build_object('error', 'stale run reaped') \
         WHERE status = 'running' AND started_at < $1 \
         RETURNING id",
    )
    .bind(older_than)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
