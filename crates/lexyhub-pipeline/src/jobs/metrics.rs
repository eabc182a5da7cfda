//! `keyword-telemetry` and `social-metrics`: daily stat rollups plus the
//! keyword engagement score.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lexyhub_core::DerivedScalars;

use super::JobContext;
use crate::error::PipelineError;
use crate::report::{JobReport, WriteReport};
use crate::sources::{collect_from_sources, mean, MetricRow, MetricSource};
use crate::upsert::{KeywordIndex, UpsertCoordinator};
use crate::window::TelemetryWindow;

pub(super) async fn aggregate_metrics(
    ctx: &JobContext,
    sources: &[Box<dyn MetricSource>],
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    let window = TelemetryWindow::new(now, ctx.settings.telemetry_lookback_days);
    let collected = collect_from_sources(sources, &window).await;
    let coordinator = UpsertCoordinator::new(ctx.store.as_ref());

    let mut writes = WriteReport::default();
    let index = coordinator
        .resolve_keywords(&collected.metrics, &mut writes)
        .await;
    let staged = UpsertCoordinator::stage_stats(&collected.metrics, &index);
    writes.absorb(coordinator.write_stats(&window, staged).await?);

    let keywords = refresh_engagement(&coordinator, &collected.metrics, index).await;

    let mut report = JobReport::from_writes(writes);
    report.failures.extend(keywords.failures);
    report.set("rows_collected", collected.metrics.len());
    report.set("keywords_updated", keywords.written);
    report.set("keywords_unchanged", keywords.unchanged);
    report.set("window_start", window.start_iso());
    report.set("sources", collected.succeeded);
    report.add_source_failures(collected.failures);
    Ok(report)
}

/// Set each keyword's `engagement_score` to the mean over its rows in the
/// window. Keywords without any engagement reading are left alone.
async fn refresh_engagement(
    coordinator: &UpsertCoordinator<'_>,
    rows: &[MetricRow],
    mut index: KeywordIndex,
) -> WriteReport {
    let mut readings: BTreeMap<(String, String), Vec<Option<f64>>> = BTreeMap::new();
    for row in rows {
        readings
            .entry((row.term.clone(), row.market.clone()))
            .or_default()
            .push(row.engagement);
    }

    let mut report = WriteReport::default();
    for (key, values) in readings {
        let Some(engagement) = mean(values) else {
            continue;
        };
        let Some(record) = index.remove(&key) else {
            continue;
        };
        let scalars = DerivedScalars {
            engagement_score: Some(engagement.round().clamp(0.0, 100.0)),
            ..DerivedScalars::default()
        };
        let result = coordinator.merge_into_record(record, None, scalars).await;
        report.record_merge(&key.0, result);
    }
    report
}
