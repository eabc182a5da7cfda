//! Database operations for `feature_flags`.

use sqlx::PgPool;

use crate::DbError;

/// Returns whether the flag is enabled. A flag with no row is disabled.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn read_feature_flag(pool: &PgPool, key: &str) -> Result<bool, DbError> {
    let enabled = sqlx::query_scalar::<_, bool>(
        "SELECT is_enabled FROM feature_flags WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(enabled.unwrap_or(false))
}

/// Creates or updates a flag.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_feature_flag(pool: &PgPool, key: &str, enabled: bool) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO feature_flags (key, is_enabled) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET is_enabled = EXCLUDED.is_enabled, updated_at = NOW()",
    )
    .bind(key)
    .bind(enabled)
    .execute(pool)
    .await?;

    Ok(())
}
