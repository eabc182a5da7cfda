//! Bulk writes and key lookups for `keyword_stats`.

use chrono::NaiveDate;
use lexyhub_core::{NewKeywordStat, StatKey};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// Natural key columns of a `keyword_stats` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatKeyRow {
    pub keyword_id: i64,
    pub source: String,
    pub recorded_on: NaiveDate,
}

impl From<StatKeyRow> for StatKey {
    fn from(row: StatKeyRow) -> Self {
        StatKey {
            keyword_id: row.keyword_id,
            source: row.source,
            recorded_on: row.recorded_on,
        }
    }
}

/// Returns the keys of every stat row recorded on or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn existing_stat_keys_since(
    pool: &PgPool,
    since: NaiveDate,
) -> Result<Vec<StatKey>, DbError> {
    let rows = sqlx::query_as::<_, StatKeyRow>(
        "SELECT keyword_id, source, recorded_on FROM keyword_stats WHERE recorded_on >= $1",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StatKey::from).collect())
}

/// Inserts stat rows in a single `UNNEST` statement.
///
/// Rows whose `(keyword_id, source, recorded_on)` already exists are left
/// untouched. Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_keyword_stats(pool: &PgPool, rows: &[NewKeywordStat]) -> Result<u64, DbError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut keyword_ids: Vec<i64> = Vec::with_capacity(rows.len());
    let mut sources: Vec<String> = Vec::with_capacity(rows.len());
    let mut recorded_ons: Vec<NaiveDate> = Vec::with_capacity(rows.len());
    let mut search_volumes: Vec<Option<i64>> = Vec::with_capacity(rows.len());
    let mut impressions: Vec<Option<i64>> = Vec::with_capacity(rows.len());
    let mut clicks: Vec<Option<i64>> = Vec::with_capacity(rows.len());
    let mut ctrs: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut conversion_rates: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut costs: Vec<Option<Decimal>> = Vec::with_capacity(rows.len());
    let mut ranks: Vec<Option<i32>> = Vec::with_capacity(rows.len());
    let mut metadata: Vec<Value> = Vec::with_capacity(rows.len());

    for row in rows {
        keyword_ids.push(row.keyword_id);
        sources.push(row.source.clone());
        recorded_ons.push(row.recorded_on);
        search_volumes.push(row.search_volume);
        impressions.push(row.impressions);
        clicks.push(row.clicks);
        ctrs.push(row.ctr);
        conversion_rates.push(row.conversion_rate);
        costs.push(row.cost);
        ranks.push(row.rank);
        metadata.push(row.metadata.clone());
    }

    let result = sqlx::query(
        "INSERT INTO keyword_stats (\
             keyword_id, source, recorded_on, search_volume, impressions, clicks, \
             ctr, conversion_rate, cost, rank, metadata\
         ) \
         SELECT * FROM UNNEST(\
             $1::bigint[], $2::text[], $3::date[], $4::bigint[], $5::bigint[], $6::bigint[], \
             $7::float8[], $8::float8[], $9::numeric[], $10::int4[], $11::jsonb[]\
         ) \
         ON CONFLICT (keyword_id, source, recorded_on) DO NOTHING",
    )
    .bind(&keyword_ids)
    .bind(&sources)
    .bind(&recorded_ons)
    .bind(&search_volumes)
    .bind(&impressions)
    .bind(&clicks)
    .bind(&ctrs)
    .bind(&conversion_rates)
    .bind(&costs)
    .bind(&ranks)
    .bind(&metadata)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
