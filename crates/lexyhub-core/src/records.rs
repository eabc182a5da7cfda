use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Natural key of a `keyword_stats` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatKey {
    pub keyword_id: i64,
    pub source: String,
    pub recorded_on: NaiveDate,
}

/// Natural key of a `trend_series` row. `term` is the normalized term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrendKey {
    pub term: String,
    pub source: String,
    pub recorded_on: NaiveDate,
}

/// A daily stat rollup ready to be written to `keyword_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKeywordStat {
    pub keyword_id: i64,
    pub source: String,
    pub recorded_on: NaiveDate,
    pub search_volume: Option<i64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    /// Click-through rate as a ratio in `[0, 1]`.
    pub ctr: Option<f64>,
    /// Conversions per click as a ratio in `[0, 1]`.
    pub conversion_rate: Option<f64>,
    pub cost: Option<Decimal>,
    pub rank: Option<i32>,
    pub metadata: Value,
}

impl NewKeywordStat {
    #[must_use]
    pub fn key(&self) -> StatKey {
        StatKey {
            keyword_id: self.keyword_id,
            source: self.source.clone(),
            recorded_on: self.recorded_on,
        }
    }
}

/// A single trend observation ready to be written to `trend_series`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrendPoint {
    /// Normalized term.
    pub term: String,
    pub source: String,
    pub recorded_on: NaiveDate,
    pub trend_score: Option<f64>,
    pub velocity: Option<f64>,
    pub expected_growth_30d: Option<f64>,
    pub extras: Value,
}

impl NewTrendPoint {
    #[must_use]
    pub fn key(&self) -> TrendKey {
        TrendKey {
            term: self.term.clone(),
            source: self.source.clone(),
            recorded_on: self.recorded_on,
        }
    }
}
