//! `reap-stale-runs`: fail ledger rows abandoned in `running`.

use chrono::{DateTime, Duration, Utc};

use super::JobContext;
use crate::error::PipelineError;
use crate::report::JobReport;

pub(super) async fn reap_stale_runs(
    ctx: &JobContext,
    now: DateTime<Utc>,
) -> Result<JobReport, PipelineError> {
    let older_than = now - Duration::minutes(i64::from(ctx.settings.stale_run_minutes));
    let reaped = ctx.store.reap_stale_runs(older_than).await?;
    if !reaped.is_empty() {
        tracing::warn!(count = reaped.len(), ?reaped, "reaped stale job runs");
    }

    let mut report = JobReport {
        processed: reaped.len() as u64,
        ..JobReport::default()
    };
    report.set("older_than", older_than.to_rfc3339());
    report.set("reaped_run_ids", reaped);
    Ok(report)
}
