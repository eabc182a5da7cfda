use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::{
    DerivedScalars, JobName, JobStatus, KeywordExtras, NewKeywordStat, NewTrendPoint,
    SeasonalPeriod, SectionKind, StatKey, TrendKey,
};
use lexyhub_db::{DbError, JobRunRow, KeywordRow};
use serde_json::Value;
use sqlx::PgPool;

use super::{
    EventType, JobRunRecord, KeywordEvent, KeywordRecord, KeywordStore, SignalFeed,
    SocialMention,
};
use crate::error::StoreError;

/// [`KeywordStore`] and [`SignalFeed`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<KeywordRow> for KeywordRecord {
    fn from(row: KeywordRow) -> Self {
        KeywordRecord {
            id: row.id,
            term: row.term,
            term_normalized: row.term_normalized,
            market: row.market,
            source: row.source,
            scores: DerivedScalars {
                demand_index: row.demand_index,
                competition_score: row.competition_score,
                engagement_score: row.engagement_score,
                trend_momentum: row.trend_momentum,
            },
            extras: KeywordExtras::from_json(row.extras),
        }
    }
}

fn job_run_from_row(row: JobRunRow) -> Result<JobRunRecord, StoreError> {
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(JobRunRecord {
        id: row.id,
        job_name: row.job_name,
        status,
        started_at: row.started_at,
        finished_at: row.finished_at,
        records_processed: u64::try_from(row.records_processed).unwrap_or(0),
        metadata: row.metadata,
    })
}

fn limit_i64(limit: u32) -> i64 {
    i64::from(limit)
}

#[async_trait]
impl KeywordStore for PgStore {
    async fn select_existing_stat_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<StatKey>, StoreError> {
        let keys = lexyhub_db::existing_stat_keys_since(&self.pool, since).await?;
        Ok(keys.into_iter().collect())
    }

    async fn select_existing_trend_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<TrendKey>, StoreError> {
        let keys = lexyhub_db::existing_trend_keys_since(&self.pool, since).await?;
        Ok(keys.into_iter().collect())
    }

    async fn select_trend_points_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<NewTrendPoint>, StoreError> {
        Ok(lexyhub_db::list_trend_series_since(&self.pool, since).await?)
    }

    async fn upsert_keyword_stats(&self, rows: &[NewKeywordStat]) -> Result<u64, StoreError> {
        Ok(lexyhub_db::insert_keyword_stats(&self.pool, rows).await?)
    }

    async fn upsert_trend_series(&self, rows: &[NewTrendPoint]) -> Result<u64, StoreError> {
        Ok(lexyhub_db::upsert_trend_series(&self.pool, rows).await?)
    }

    async fn ensure_keyword(
        &self,
        term: &str,
        market: &str,
        source: &str,
    ) -> Result<KeywordRecord, StoreError> {
        let row = lexyhub_db::ensure_keyword(&self.pool, term, market, source).await?;
        Ok(row.into())
    }

    async fn select_keyword(
        &self,
        term: &str,
        market: &str,
    ) -> Result<Option<KeywordRecord>, StoreError> {
        let row = lexyhub_db::get_keyword(&self.pool, term, market).await?;
        Ok(row.map(KeywordRecord::from))
    }

    async fn update_keyword_extras(
        &self,
        id: i64,
        merged: &KeywordExtras,
        touched: Option<SectionKind>,
        scalars: &DerivedScalars,
    ) -> Result<(), StoreError> {
        // Only the touched section goes over the wire; the statement merges
        // it with `||` so sections owned by other jobs stay as stored. A
        // section missing from `merged` is sent as JSON null, which deletes it.
        let section = match touched {
            Some(kind) => {
                let mut doc = merged.to_json()?;
                let value = doc
                    .get_mut(kind.key())
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                Some((kind.key(), value))
            }
            None => None,
        };

        let result = lexyhub_db::update_keyword(
            &self.pool,
            id,
            section.as_ref().map(|(key, value)| (*key, value)),
            scalars,
        )
        .await;

        match result {
            Err(DbError::NotFound) => Err(StoreError::KeywordNotFound(id)),
            other => Ok(other?),
        }
    }

    async fn list_keywords_missing_section(
        &self,
        section: SectionKind,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let rows =
            lexyhub_db::list_keywords_missing_section(&self.pool, section.key(), limit_i64(limit))
                .await?;
        Ok(rows.into_iter().map(KeywordRecord::from).collect())
    }

    async fn list_keywords(
        &self,
        market: Option<&str>,
        after_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let rows =
            lexyhub_db::list_keywords(&self.pool, market, after_id, limit_i64(limit)).await?;
        Ok(rows.into_iter().map(KeywordRecord::from).collect())
    }

    async fn insert_job_run(&self, job: JobName) -> Result<i64, StoreError> {
        Ok(lexyhub_db::insert_job_run(&self.pool, job.as_str()).await?)
    }

    async fn insert_skipped_job_run(
        &self,
        job: JobName,
        reason: &str,
    ) -> Result<i64, StoreError> {
        Ok(lexyhub_db::insert_skipped_job_run(&self.pool, job.as_str(), reason).await?)
    }

    async fn finalize_job_run(
        &self,
        run_id: i64,
        status: JobStatus,
        records_processed: u64,
        metadata: &Value,
    ) -> Result<(), StoreError> {
        let records = i32::try_from(records_processed).unwrap_or(i32::MAX);
        let result =
            lexyhub_db::finalize_job_run(&self.pool, run_id, status, records, metadata).await;

        match result {
            Err(DbError::InvalidJobRunTransition { id, .. }) => Err(StoreError::RunNotRunning(id)),
            other => Ok(other?),
        }
    }

    async fn list_job_runs(&self, limit: u32) -> Result<Vec<JobRunRecord>, StoreError> {
        let rows = lexyhub_db::list_job_runs(&self.pool, limit_i64(limit)).await?;
        rows.into_iter().map(job_run_from_row).collect()
    }

    async fn reap_stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        Ok(lexyhub_db::reap_stale_job_runs(&self.pool, older_than).await?)
    }

    async fn read_feature_flag(&self, key: &str) -> Result<bool, StoreError> {
        Ok(lexyhub_db::read_feature_flag(&self.pool, key).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(lexyhub_db::health_check(&self.pool).await?)
    }
}

#[async_trait]
impl SignalFeed for PgStore {
    async fn list_keyword_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<KeywordEvent>, StoreError> {
        let rows = lexyhub_db::list_keyword_events_since(&self.pool, since).await?;

        let events = rows
            .into_iter()
            .filter_map(|row| match row.event_type.parse::<EventType>() {
                Ok(event_type) => Some(KeywordEvent {
                    term: row.term,
                    market: row.market,
                    event_type,
                    occurred_at: row.occurred_at,
                    cost: row.cost,
                    rank: row.rank,
                }),
                Err(e) => {
                    tracing::debug!(event_id = row.id, error = %e, "skipping keyword event");
                    None
                }
            })
            .collect();

        Ok(events)
    }

    async fn list_social_mentions(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SocialMention>, StoreError> {
        let rows = lexyhub_db::list_social_mentions_since(&self.pool, platform, since).await?;

        Ok(rows
            .into_iter()
            .map(|row| SocialMention {
                platform: row.platform,
                term: row.term,
                observed_at: row.observed_at,
                mentions: i64::from(row.mentions),
                engagement_score: row.engagement_score,
                sentiment: row.sentiment,
            })
            .collect())
    }

    async fn list_seasonal_periods(&self) -> Result<Vec<SeasonalPeriod>, StoreError> {
        Ok(lexyhub_db::list_seasonal_periods(&self.pool).await?)
    }
}
