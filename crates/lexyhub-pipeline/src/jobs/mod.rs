//! The job catalogue and its dispatcher.
//!
//! Each job is an async function over a [`JobContext`]. [`run_named_job`]
//! builds the job's sources first, so a misconfigured source aborts before
//! the ledger is touched, then hands the body to [`crate::ledger::run_job`].

mod classification;
mod metrics;
mod reaper;
mod seasonal;
mod trends;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexyhub_core::{AppConfig, JobName, DEFAULT_MARKET};
use serde::Serialize;
use sqlx::PgPool;

use crate::classify::{Classifier, LexiconClassifier};
use crate::error::PipelineError;
use crate::ledger::{run_job, JobSummary};
use crate::report::JobReport;
use crate::sources::{
    HttpSettings, MetricSource, SearchTelemetrySource, SeasonalCalendar, SocialPlatformSource,
    TrendFeedSource,
};
use crate::store::{KeywordStore, PgStore, SignalFeed};

pub use seasonal::{base_demand, boosted_demand};

/// Tunables every job reads, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub default_market: String,
    pub telemetry_lookback_days: u32,
    pub trend_lookback_days: u32,
    pub social_platforms: Vec<String>,
    pub trend_feed_urls: Vec<String>,
    pub http: HttpSettings,
    pub seasonal_lookahead_days: u32,
    pub seasonal_country: String,
    pub classification_batch: u32,
    pub stale_run_minutes: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            default_market: DEFAULT_MARKET.to_string(),
            telemetry_lookback_days: 7,
            trend_lookback_days: 30,
            social_platforms: ["reddit", "pinterest", "tiktok"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            trend_feed_urls: Vec::new(),
            http: HttpSettings {
                timeout_secs: 30,
                user_agent: "lexyhub/0.1 (keyword-intelligence)".to_string(),
                max_retries: 3,
                backoff_base_ms: 2_000,
            },
            seasonal_lookahead_days: 45,
            seasonal_country: "US".to_string(),
            classification_batch: 100,
            stale_run_minutes: 120,
        }
    }
}

impl JobSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            default_market: config.default_market.clone(),
            telemetry_lookback_days: config.telemetry_lookback_days,
            trend_lookback_days: config.trend_lookback_days,
            social_platforms: config.social_platforms.clone(),
            trend_feed_urls: config.trend_feed_urls.clone(),
            http: HttpSettings {
                timeout_secs: config.http_timeout_secs,
                user_agent: config.http_user_agent.clone(),
                max_retries: config.http_max_retries,
                backoff_base_ms: config.http_retry_backoff_base_secs.saturating_mul(1_000),
            },
            seasonal_lookahead_days: config.seasonal_lookahead_days,
            seasonal_country: config.seasonal_country.clone(),
            classification_batch: config.classification_batch,
            stale_run_minutes: config.stale_run_minutes,
        }
    }
}

/// Everything a job needs; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn KeywordStore>,
    pub signals: Arc<dyn SignalFeed>,
    pub classifier: Arc<dyn Classifier>,
    pub settings: JobSettings,
}

impl JobContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeywordStore>,
        signals: Arc<dyn SignalFeed>,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            signals,
            classifier: Arc::new(LexiconClassifier::new()),
            settings,
        }
    }

    /// A context whose store and signal feed are the same Postgres pool.
    #[must_use]
    pub fn postgres(pool: PgPool, settings: JobSettings) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self::new(store.clone(), store, settings)
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("classifier", &self.classifier.model())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One entry of the job catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: JobName,
    pub gate_flag: Option<&'static str>,
    pub description: &'static str,
}

#[must_use]
pub fn catalogue() -> Vec<JobInfo> {
    JobName::ALL
        .into_iter()
        .map(|name| JobInfo {
            name,
            gate_flag: name.gate_flag(),
            description: describe(name),
        })
        .collect()
}

fn describe(job: JobName) -> &'static str {
    match job {
        JobName::KeywordTelemetry => "Roll up extension search telemetry into daily keyword stats",
        JobName::SocialMetrics => "Roll up social platform mentions into daily keyword stats",
        JobName::TrendAggregation => "Blend trend feeds into trend series and keyword momentum",
        JobName::KeywordClassification => "Classify the intent of unclassified keywords",
        JobName::SeasonalTagging => "Label keywords with upcoming seasonal periods",
        JobName::ReapStaleRuns => "Fail job runs left running past the stale threshold",
    }
}

/// Build the sources `job` reads from.
fn build_sources(
    ctx: &JobContext,
    job: JobName,
) -> Result<Vec<Box<dyn MetricSource>>, PipelineError> {
    let settings = &ctx.settings;
    let sources: Vec<Box<dyn MetricSource>> = match job {
        JobName::KeywordTelemetry => {
            vec![Box::new(SearchTelemetrySource::new(ctx.signals.clone()))]
        }
        JobName::SocialMetrics => settings
            .social_platforms
            .iter()
            .map(|platform| {
                Box::new(SocialPlatformSource::new(
                    platform,
                    &settings.default_market,
                    ctx.signals.clone(),
                )) as Box<dyn MetricSource>
            })
            .collect(),
        JobName::TrendAggregation => settings
            .trend_feed_urls
            .iter()
            .map(|url| {
                TrendFeedSource::new(url, &settings.http)
                    .map(|feed| Box::new(feed) as Box<dyn MetricSource>)
                    .map_err(|e| PipelineError::Config(e.to_string()))
            })
            .collect::<Result<_, _>>()?,
        JobName::SeasonalTagging => vec![Box::new(SeasonalCalendar::new(
            &settings.seasonal_country,
            settings.seasonal_lookahead_days,
            ctx.signals.clone(),
        ))],
        JobName::KeywordClassification | JobName::ReapStaleRuns => Vec::new(),
    };
    Ok(sources)
}

async fn execute(
    ctx: &JobContext,
    job: JobName,
    sources: Vec<Box<dyn MetricSource>>,
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    match job {
        JobName::KeywordTelemetry | JobName::SocialMetrics => {
            metrics::aggregate_metrics(ctx, &sources, now).await
        }
        JobName::TrendAggregation => trends::aggregate_trends(ctx, &sources, now).await,
        JobName::KeywordClassification => classification::classify_keywords(ctx, now).await,
        JobName::SeasonalTagging => seasonal::tag_seasonal(ctx, &sources, now).await,
        JobName::ReapStaleRuns => reaper::reap_stale_runs(ctx, now).await,
    }
}

/// Run `job` now.
///
/// # Errors
///
/// See [`run_named_job_at`].
pub async fn run_named_job(ctx: &JobContext, job: JobName) -> Result<JobSummary, PipelineError> {
    run_named_job_at(ctx, job, Utc::now()).await
}

/// Run `job` as if the clock read `now`.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if a source cannot be built, and the
/// ledger's errors when no run row could be recorded. Failures inside the
/// job are reported in the returned [`JobSummary`].
pub async fn run_named_job_at(
    ctx: &JobContext,
    job: JobName,
    now: DateTime<Utc>,
) -> Result<JobSummary, PipelineError> {
    let sources = build_sources(ctx, job)?;
    run_job(ctx.store.as_ref(), job, |run_id| {
        tracing::debug!(job = %job, run_id, sources = sources.len(), "executing job body");
        execute(ctx, job, sources, now)
    })
    .await
}
