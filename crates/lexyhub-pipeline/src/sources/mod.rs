//! Data sources and the concurrent collector.
//!
//! Every source maps its own raw shape into one of the normalized batches in
//! [`SourceBatch`]. [`collect_from_sources`] runs them side by side and keeps
//! going past individual failures.

mod seasonal;
mod social;
mod telemetry;
mod trend_feed;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use lexyhub_core::SeasonalPeriod;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::error::SourceError;
use crate::window::TelemetryWindow;

pub use seasonal::SeasonalCalendar;
pub use social::SocialPlatformSource;
pub use telemetry::{SearchTelemetrySource, SEARCH_TELEMETRY_SOURCE};
pub use trend_feed::{HttpSettings, TrendFeedSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SocialPlatform,
    SearchTelemetry,
    TrendFeed,
    SeasonalCalendar,
}

/// A stat-shaped daily rollup for one term.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    /// Normalized term.
    pub term: String,
    pub market: String,
    pub source: String,
    pub recorded_on: NaiveDate,
    pub search_volume: Option<i64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub ctr: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub cost: Option<Decimal>,
    pub rank: Option<i32>,
    /// Engagement on the canonical 0–100 scale, when the source measures it.
    pub engagement: Option<f64>,
    pub metadata: Value,
}

/// One trend reading for a term on a day.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendObservation {
    /// Normalized term.
    pub term: String,
    pub source: String,
    pub recorded_on: NaiveDate,
    pub trend_score: Option<f64>,
    pub velocity: Option<f64>,
    pub expected_growth_30d: Option<f64>,
    pub extras: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceBatch {
    Metrics(Vec<MetricRow>),
    Trends(Vec<TrendObservation>),
    Periods(Vec<SeasonalPeriod>),
}

impl SourceBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Metrics(rows) => rows.len(),
            Self::Trends(rows) => rows.len(),
            Self::Periods(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Stable name written into `source` columns and failure reports.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn fetch(&self, window: &TelemetryWindow) -> Result<SourceBatch, SourceError>;
}

/// A source that failed during collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Everything the sources of one run produced.
#[derive(Debug, Default)]
pub struct Collected {
    pub metrics: Vec<MetricRow>,
    pub trends: Vec<TrendObservation>,
    pub periods: Vec<SeasonalPeriod>,
    pub succeeded: Vec<String>,
    pub failures: Vec<SourceFailure>,
}

/// Fetch every source concurrently.
///
/// A failing source is logged and reported in [`Collected::failures`]; it
/// never prevents the others' rows from being returned.
pub async fn collect_from_sources(
    sources: &[Box<dyn MetricSource>],
    window: &TelemetryWindow,
) -> Collected {
    let results = join_all(sources.iter().map(|source| async move {
        (source.name().to_string(), source.fetch(window).await)
    }))
    .await;

    let mut collected = Collected::default();
    for (name, result) in results {
        match result {
            Ok(batch) => {
                tracing::debug!(source = %name, count = batch.len(), "collected source rows");
                match batch {
                    SourceBatch::Metrics(rows) => collected.metrics.extend(rows),
                    SourceBatch::Trends(rows) => collected.trends.extend(rows),
                    SourceBatch::Periods(rows) => collected.periods.extend(rows),
                }
                collected.succeeded.push(name);
            }
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "source fetch failed");
                collected.failures.push(SourceFailure {
                    source: name,
                    error: e.to_string(),
                });
            }
        }
    }
    collected
}

/// Arithmetic mean of the `Some` values, or `None` if there are none.
pub(crate) fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}
