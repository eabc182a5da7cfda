//! Bulk upserts and key lookups for `trend_series`.

use chrono::NaiveDate;
use lexyhub_core::{NewTrendPoint, TrendKey};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// Natural key columns of a `trend_series` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendKeyRow {
    pub term: String,
    pub source: String,
    pub recorded_on: NaiveDate,
}

impl From<TrendKeyRow> for TrendKey {
    fn from(row: TrendKeyRow) -> Self {
        TrendKey {
            term: row.term,
            source: row.source,
            recorded_on: row.recorded_on,
        }
    }
}

/// A full `trend_series` row, minus bookkeeping timestamps.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendPointRow {
    pub term: String,
    pub source: String,
    pub recorded_on: NaiveDate,
    pub trend_score: Option<f64>,
    pub velocity: Option<f64>,
    pub expected_growth_30d: Option<f64>,
    pub extras: Value,
}

impl From<TrendPointRow> for NewTrendPoint {
    fn from(row: TrendPointRow) -> Self {
        NewTrendPoint {
            term: row.term,
            source: row.source,
            recorded_on: row.recorded_on,
            trend_score: row.trend_score,
            velocity: row.velocity,
            expected_growth_30d: row.expected_growth_30d,
            extras: row.extras,
        }
    }
}

/// Returns the keys of every trend point recorded on or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn existing_trend_keys_since(
    pool: &PgPool,
    since: NaiveDate,
) -> Result<Vec<TrendKey>, DbError> {
    let rows = sqlx::query_as::<_, TrendKeyRow>(
        "SELECT term, source, recorded_on FROM trend_series WHERE recorded_on >= $1",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TrendKey::from).collect())
}

/// Upserts trend points in a single `UNNEST` statement, updating values in
/// place on `(term, source, recorded_on)` conflict.
///
/// `rows` must not repeat a key; Postgres rejects an `ON CONFLICT DO UPDATE`
/// that would touch the same row twice.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_trend_series(pool: &PgPool, rows: &[NewTrendPoint]) -> Result<u64, DbError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut terms: Vec<String> = Vec::with_capacity(rows.len());
    let mut sources: Vec<String> = Vec::with_capacity(rows.len());
    let mut recorded_ons: Vec<NaiveDate> = Vec::with_capacity(rows.len());
    let mut trend_scores: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut velocities: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut growths: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut extras: Vec<Value> = Vec::with_capacity(rows.len());

    for row in rows {
        terms.push(row.term.clone());
        sources.push(row.source.clone());
        recorded_ons.push(row.recorded_on);
        trend_scores.push(row.trend_score);
        velocities.push(row.velocity);
        growths.push(row.expected_growth_30d);
        extras.push(row.extras.clone());
    }

    let result = sqlx::query(
        "INSERT INTO trend_series (\
             term, source, recorded_on, trend_score, velocity, expected_growth_30d, extras\
         ) \
         SELECT * FROM UNNEST(\
             $1::text[], $2::text[], $3::date[], $4::float8[], $5::float8[], $6::float8[], \
             $7::jsonb[]\
         ) \
         ON CONFLICT (term, source, recorded_on) DO UPDATE SET \
             trend_score = EXCLUDED.trend_score, \
             velocity = EXCLUDED.velocity, \
             expected_growth_30d = EXCLUDED.expected_growth_30d, \
             extras = trend_series.extras || EXCLUDED.extras, \
             updated_at = NOW()",
    )
    .bind(&terms)
    .bind(&sources)
    .bind(&recorded_ons)
    .bind(&trend_scores)
    .bind(&velocities)
    .bind(&growths)
    .bind(&extras)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns every trend point recorded on or after `since`, ordered by its
/// natural key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_trend_series_since(
    pool: &PgPool,
    since: NaiveDate,
) -> Result<Vec<NewTrendPoint>, DbError> {
    let rows = sqlx::query_as::<_, TrendPointRow>(
        "SELECT term, source, recorded_on, trend_score, velocity, expected_growth_30d, extras \
         FROM trend_series \
         WHERE recorded_on >= $1 \
         ORDER BY term, recorded_on, source",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(NewTrendPoint::from).collect())
}
