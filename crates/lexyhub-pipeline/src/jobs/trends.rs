//! `trend-aggregation`: persist feed observations, blend them per term and
//! publish the result on the keyword.
//!
//! The blend runs over every point stored for the window, not just what this
//! run fetched, so a feed that is down keeps contributing its earlier points.

use chrono::{DateTime, Utc};
use lexyhub_core::{
    normalize_score, DerivedScalars, ExtrasSection, NewTrendPoint, DEFAULT_FALLBACK,
};

use super::JobContext;
use crate::blend::TrendBlender;
use crate::error::PipelineError;
use crate::report::{JobReport, WriteReport};
use crate::sources::{collect_from_sources, MetricSource, TrendObservation};
use crate::upsert::{trend_points, UpsertCoordinator};
use crate::window::TelemetryWindow;

const KEYWORD_SOURCE: &str = "trend_feed";

fn to_observation(point: NewTrendPoint) -> TrendObservation {
    TrendObservation {
        term: point.term,
        source: point.source,
        recorded_on: point.recorded_on,
        trend_score: point.trend_score,
        velocity: point.velocity,
        expected_growth_30d: point.expected_growth_30d,
        extras: point.extras,
    }
}

pub(super) async fn aggregate_trends(
    ctx: &JobContext,
    sources: &[Box<dyn MetricSource>],
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    let window = TelemetryWindow::new(now, ctx.settings.trend_lookback_days);
    if sources.is_empty() {
        tracing::info!("no trend feeds configured");
    }
    let collected = collect_from_sources(sources, &window).await;
    let coordinator = UpsertCoordinator::new(ctx.store.as_ref());

    let writes = coordinator
        .write_trend_series(&window, trend_points(&collected.trends))
        .await?;

    let stored: Vec<TrendObservation> = ctx
        .store
        .select_trend_points_since(window.start_date())
        .await?
        .into_iter()
        .filter(|p| window.contains(p.recorded_on))
        .map(to_observation)
        .collect();
    let mut blender = TrendBlender::new();
    blender.fold(&stored);

    let mut keywords = WriteReport::default();
    for (term, entry) in blender.entries() {
        let Some(detail) = entry.to_detail() else {
            tracing::debug!(term = %term, "no velocity observed, keyword left unchanged");
            continue;
        };
        let scalars = DerivedScalars {
            trend_momentum: Some(normalize_score(entry.momentum, DEFAULT_FALLBACK)),
            ..DerivedScalars::default()
        };
        let result = coordinator
            .merge_keyword_section(
                term,
                &ctx.settings.default_market,
                KEYWORD_SOURCE,
                Some(ExtrasSection::Trend(detail)),
                scalars,
            )
            .await;
        keywords.record_merge(term, result);
    }

    let mut report = JobReport::from_writes(writes);
    report.failures.extend(keywords.failures);
    report.set("observations", collected.trends.len());
    report.set("window_points", stored.len());
    report.set("terms_blended", blender.len());
    report.set("keywords_updated", keywords.written);
    report.set("keywords_unchanged", keywords.unchanged);
    report.set("window_start", window.start_iso());
    report.set("sources", collected.succeeded);
    report.add_source_failures(collected.failures);
    Ok(report)
}
