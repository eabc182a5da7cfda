//! Database operations for the `keywords` table (the golden source).

use chrono::{DateTime, Utc};
use lexyhub_core::{normalize_term, DerivedScalars};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `keywords` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordRow {
    pub id: i64,
    pub public_id: Uuid,
    pub term: String,
    pub term_normalized: String,
    pub market: String,
    pub source: String,
    pub demand_index: Option<f64>,
    pub competition_score: Option<f64>,
    pub engagement_score: Option<f64>,
    pub trend_momentum: Option<f64>,
    pub extras: Value,
    pub freshness_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const KEYWORD_COLUMNS: &str = "id, public_id, term, term_normalized, market, source, \
     demand_index, competition_score, engagement_score, trend_momentum, extras, \
     freshness_ts, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns the keyword for `(normalize_term(term), market)`, creating it on
/// first observation.
///
/// Conflicts on `(term_normalized, market)` only bump `freshness_ts`; the
/// original display `term` and first-observation `source` are kept.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn ensure_keyword(
    pool: &PgPool,
    term: &str,
    market: &str,
    source: &str,
) -> Result<KeywordRow, DbError> {
    let public_id = Uuid::new_v4();
    let sql = format!(
        "INSERT INTO keywords (public_id, term, term_normalized, market, source) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (term_normalized, market) DO UPDATE SET freshness_ts = NOW() \
         RETURNING {KEYWORD_COLUMNS}"
    );

    let row = sqlx::query_as::<_, KeywordRow>(&sql)
        .bind(public_id)
        .bind(term.trim())
        .bind(normalize_term(term))
        .bind(market)
        .bind(source)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Returns the keyword for `(normalize_term(term), market)`, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_keyword(
    pool: &PgPool,
    term: &str,
    market: &str,
) -> Result<Option<KeywordRow>, DbError> {
    let sql = format!(
        "SELECT {KEYWORD_COLUMNS} FROM keywords \
         WHERE term_normalized = $1 AND market = $2"
    );

    let row = sqlx::query_as::<_, KeywordRow>(&sql)
        .bind(normalize_term(term))
        .bind(market)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Writes one extras section and any derived scalar columns.
///
/// The section is merged with `extras || jsonb_build_object(key, value)`, so
/// keys written concurrently by other jobs are preserved. A JSON `null` value
/// removes the key instead. `section` of `None` leaves `extras` untouched.
/// Scalars that are `None` keep their stored value.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no keyword has the given `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_keyword(
    pool: &PgPool,
    id: i64,
    section: Option<(&str, &Value)>,
    scalars: &DerivedScalars,
) -> Result<(), DbError> {
    let (section_key, section_value) = match section {
        Some((key, value)) => (Some(key), Some(value)),
        None => (None, None),
    };

    let result = sqlx::query(
        "UPDATE keywords SET \
             extras = CASE WHEN $2::TEXT IS NULL THEN extras \
                           WHEN $3::JSONB = 'null'::JSONB THEN extras - $2::TEXT \
                           ELSE extras || jsonb_build_object($2::TEXT, $3::JSONB) END, \
             demand_index      = COALESCE($4, demand_index), \
             competition_score = COALESCE($5, competition_score), \
             engagement_score  = COALESCE($6, engagement_score), \
             trend_momentum    = COALESCE($7, trend_momentum), \
             freshness_ts = NOW(), \
             updated_at   = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(section_key)
    .bind(section_value)
    .bind(scalars.demand_index)
    .bind(scalars.competition_score)
    .bind(scalars.engagement_score)
    .bind(scalars.trend_momentum)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Returns up to `limit` keywords whose `extras` lack the `section_key`
/// sub-key, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_keywords_missing_section(
    pool: &PgPool,
    section_key: &str,
    limit: i64,
) -> Result<Vec<KeywordRow>, DbError> {
    let sql = format!(
        "SELECT {KEYWORD_COLUMNS} FROM keywords \
         WHERE NOT (extras ? $1) \
         ORDER BY created_at, id \
         LIMIT $2"
    );

    let rows = sqlx::query_as::<_, KeywordRow>(&sql)
        .bind(section_key)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns up to `limit` keywords with `id` greater than `after_id`,
/// optionally restricted to one market, ordered by `id`.
///
/// Passing the last `id` of one page as `after_id` yields the next page.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_keywords(
    pool: &PgPool,
    market: Option<&str>,
    after_id: Option<i64>,
    limit: i64,
) -> Result<Vec<KeywordRow>, DbError> {
    let sql = format!(
        "SELECT {KEYWORD_COLUMNS} FROM keywords \
         WHERE ($1::TEXT IS NULL OR market = $1) \
           AND ($2::BIGINT IS NULL OR id > $2) \
         ORDER BY id \
         LIMIT $3"
    );

    let rows = sqlx::query_as::<_, KeywordRow>(&sql)
        .bind(market)
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
