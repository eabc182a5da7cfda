//! Read-only access to the raw signal tables written by collaborators:
//! `keyword_events`, `social_mentions` and `seasonal_periods`.

use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::SeasonalPeriod;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from `keyword_events`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordEventRow {
    pub id: i64,
    pub term: String,
    pub market: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub cost: Option<Decimal>,
    pub rank: Option<i32>,
}

/// A row from `social_mentions`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialMentionRow {
    pub id: i64,
    pub platform: String,
    pub term: String,
    pub observed_at: DateTime<Utc>,
    pub mentions: i32,
    pub engagement_score: Option<f64>,
    pub sentiment: Option<f64>,
}

/// A row from `seasonal_periods`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SeasonalPeriodRow {
    pub id: i64,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub weight: f64,
    pub country: Option<String>,
    pub tags: Vec<String>,
    pub recurring: bool,
}

impl From<SeasonalPeriodRow> for SeasonalPeriod {
    fn from(row: SeasonalPeriodRow) -> Self {
        SeasonalPeriod {
            id: row.id,
            name: row.name,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            weight: row.weight,
            country: row.country,
            tags: row.tags,
            recurring: row.recurring,
        }
    }
}

/// Returns every extension event that occurred at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_keyword_events_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<KeywordEventRow>, DbError> {
    let rows = sqlx::query_as::<_, KeywordEventRow>(
        "SELECT id, term, market, event_type, occurred_at, cost, rank \
         FROM keyword_events \
         WHERE occurred_at >= $1 \
         ORDER BY occurred_at, id",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every mention observed on `platform` at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_social_mentions_since(
    pool: &PgPool,
    platform: &str,
    since: DateTime<Utc>,
) -> Result<Vec<SocialMentionRow>, DbError> {
    let rows = sqlx::query_as::<_, SocialMentionRow>(
        "SELECT id, platform, term, observed_at, mentions, engagement_score, sentiment \
         FROM social_mentions \
         WHERE platform = $1 AND observed_at >= $2 \
         ORDER BY observed_at, id",
    )
    .bind(platform)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every seasonal period, ordered by start date.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_seasonal_periods(pool: &PgPool) -> Result<Vec<SeasonalPeriod>, DbError> {
    let rows = sqlx::query_as::<_, SeasonalPeriodRow>(
        "SELECT id, name, starts_on, ends_on, weight, country, tags, recurring \
         FROM seasonal_periods \
         ORDER BY starts_on, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SeasonalPeriod::from).collect())
}
