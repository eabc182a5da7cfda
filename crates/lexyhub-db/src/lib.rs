//! Postgres access for the keyword pipeline.
//!
//! One module per table family; every function takes a `&PgPool` and
//! returns [`DbError`]. Bulk writes go through `UNNEST` so a batch is one
//! statement.

pub mod feature_flags;
pub mod job_runs;
pub mod keyword_stats;
pub mod keywords;
pub mod signal_inputs;
pub mod trend_series;

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use feature_flags::{read_feature_flag, set_feature_flag};
pub use job_runs::{
    finalize_job_run, get_job_run, insert_job_run, insert_skipped_job_run, list_job_runs,
    reap_stale_job_runs, JobRunRow,
};
pub use keyword_stats::{existing_stat_keys_since, insert_keyword_stats, StatKeyRow};
pub use keywords::{
    ensure_keyword, get_keyword, list_keywords, list_keywords_missing_section, update_keyword,
    KeywordRow,
};
pub use signal_inputs::{
    list_keyword_events_since, list_seasonal_periods, list_social_mentions_since,
    KeywordEventRow, SeasonalPeriodRow, SocialMentionRow,
};
pub use trend_series::{
    existing_trend_keys_since, list_trend_series_since, upsert_trend_series, TrendKeyRow,
    TrendPointRow,
};

// Resolves to <workspace-root>/migrations/.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Pool sizing, normally taken from [`lexyhub_core::AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &lexyhub_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("job run {id} is not in expected status '{expected_status}'")]
    InvalidJobRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Open a pool against `database_url`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Apply pending migrations. Returns how many were pending beforehand.
///
/// # Errors
///
/// Returns [`DbError`] if the ledger cannot be read or a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let applied: Vec<i64> = match sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations WHERE success",
    )
    .fetch_all(pool)
    .await
    {
        Ok(versions) => versions,
        // Fresh database: the migrations table does not exist yet.
        Err(sqlx::Error::Database(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let pending = MIGRATOR
        .iter()
        .filter(|m| m.migration_type.is_up_migration() && !applied.contains(&m.version))
        .count();

    MIGRATOR.run(pool).await?;
    Ok(pending)
}

/// Round-trip a trivial query to prove the pool can serve requests.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
