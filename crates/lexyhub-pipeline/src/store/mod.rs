//! Storage seams used by the aggregation core.
//!
//! [`KeywordStore`] covers everything the jobs write (keywords, stats, trend
//! series, the run ledger) plus the feature-flag gate. [`SignalFeed`] covers
//! the raw inputs collaborators write and the sources read. Both are
//! implemented by [`PgStore`] for production and [`MemoryStore`] for tests
//! and offline runs.

mod memory;
mod postgres;

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lexyhub_core::{
    DerivedScalars, JobName, JobStatus, KeywordExtras, NewKeywordStat, NewTrendPoint,
    SeasonalPeriod, SectionKind, StatKey, TrendKey,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A keyword as seen by the jobs: identity, denormalized scores and typed extras.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRecord {
    pub id: i64,
    pub term: String,
    pub term_normalized: String,
    pub market: String,
    pub source: String,
    pub scores: DerivedScalars,
    pub extras: KeywordExtras,
}

/// One row of the job run ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRunRecord {
    pub id: i64,
    pub job_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Search,
    Impression,
    Click,
    Conversion,
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Self::Search),
            "impression" => Ok(Self::Impression),
            "click" => Ok(Self::Click),
            "conversion" => Ok(Self::Conversion),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// One search-telemetry event captured by the browser extension.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordEvent {
    pub term: String,
    pub market: String,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub cost: Option<Decimal>,
    pub rank: Option<i32>,
}

/// One observation of a term on a social platform.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialMention {
    pub platform: String,
    pub term: String,
    pub observed_at: DateTime<Utc>,
    pub mentions: i64,
    pub engagement_score: Option<f64>,
    pub sentiment: Option<f64>,
}

#[async_trait]
pub trait KeywordStore: Send + Sync {
    /// Keys of `keyword_stats` rows recorded on or after `since`.
    async fn select_existing_stat_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<StatKey>, StoreError>;

    /// Keys of `trend_series` rows recorded on or after `since`.
    async fn select_existing_trend_keys(
        &self,
        since: NaiveDate,
    ) -> Result<HashSet<TrendKey>, StoreError>;

    /// Every `trend_series` row recorded on or after `since`.
    async fn select_trend_points_since(
        &self,
        since: NaiveDate,
    ) -> Result<Vec<NewTrendPoint>, StoreError>;

    /// Insert stat rows, skipping existing keys. Returns rows inserted.
    async fn upsert_keyword_stats(&self, rows: &[NewKeywordStat]) -> Result<u64, StoreError>;

    /// Insert or update trend points. Returns rows written.
    async fn upsert_trend_series(&self, rows: &[NewTrendPoint]) -> Result<u64, StoreError>;

    async fn ensure_keyword(
        &self,
        term: &str,
        market: &str,
        source: &str,
    ) -> Result<KeywordRecord, StoreError>;

    async fn select_keyword(
        &self,
        term: &str,
        market: &str,
    ) -> Result<Option<KeywordRecord>, StoreError>;

    /// Persist merged extras and the `Some` scalars.
    ///
    /// `touched` names the one section the caller changed; implementations
    /// that can write a single section must leave every other stored section
    /// as it is. A touched section absent from `merged` is removed. `None`
    /// means only scalars changed.
    async fn update_keyword_extras(
        &self,
        id: i64,
        merged: &KeywordExtras,
        touched: Option<SectionKind>,
        scalars: &DerivedScalars,
    ) -> Result<(), StoreError>;

    async fn list_keywords_missing_section(
        &self,
        section: SectionKind,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError>;

    /// One page of keywords ordered by id, starting after `after_id`.
    async fn list_keywords(
        &self,
        market: Option<&str>,
        after_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<KeywordRecord>, StoreError>;

    async fn insert_job_run(&self, job: JobName) -> Result<i64, StoreError>;

    async fn insert_skipped_job_run(&self, job: JobName, reason: &str)
        -> Result<i64, StoreError>;

    async fn finalize_job_run(
        &self,
        run_id: i64,
        status: JobStatus,
        records_processed: u64,
        metadata: &Value,
    ) -> Result<(), StoreError>;

    async fn list_job_runs(&self, limit: u32) -> Result<Vec<JobRunRecord>, StoreError>;

    /// Fail every run still `running` that started before `older_than`.
    async fn reap_stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<i64>, StoreError>;

    /// Missing flags read as disabled.
    async fn read_feature_flag(&self, key: &str) -> Result<bool, StoreError>;

    /// Cheap liveness probe for health endpoints.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SignalFeed: Send + Sync {
    async fn list_keyword_events(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<KeywordEvent>, StoreError>;

    async fn list_social_mentions(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SocialMention>, StoreError>;

    async fn list_seasonal_periods(&self) -> Result<Vec<SeasonalPeriod>, StoreError>;
}
