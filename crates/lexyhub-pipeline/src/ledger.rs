//! Job run ledger: every invocation leaves exactly one `job_runs` row in a
//! terminal state.
//!
//! A gated job whose flag is off gets a row written directly as `skipped`.
//! Otherwise the row is opened as `running`, the body executes, and the row
//! is finalized once as `succeeded` or `failed`.

use std::future::Future;

use lexyhub_core::{JobName, JobStatus};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::PipelineError;
use crate::report::{FailureEntry, JobReport};
use crate::store::KeywordStore;

/// Outcome reported to callers. `Partial` is stored as `succeeded` in the
/// ledger, with the failures in its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Succeeded,
    Partial,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job: JobName,
    pub run_id: i64,
    pub status: SummaryStatus,
    pub processed: u64,
    pub errors: u64,
    pub failures: Vec<FailureEntry>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobSummary {
    fn empty(job: JobName, run_id: i64, status: SummaryStatus) -> Self {
        Self {
            job,
            run_id,
            status,
            processed: 0,
            errors: 0,
            failures: Vec::new(),
            metadata: Map::new(),
            error: None,
        }
    }
}

/// Check the job's gate flag. `Ok(false)` means the job must be skipped.
async fn gate_open(store: &dyn KeywordStore, job: JobName) -> Result<bool, PipelineError> {
    let Some(flag) = job.gate_flag() else {
        return Ok(true);
    };
    store
        .read_feature_flag(flag)
        .await
        .map_err(|source| PipelineError::FlagUnreadable { flag, source })
}

fn finalize_metadata(report: &JobReport) -> Result<Value, serde_json::Error> {
    let mut metadata = report.metadata.clone();
    metadata.insert("errors".to_string(), json!(report.failures.len()));
    if report.has_failures() {
        metadata.insert("failures".to_string(), serde_json::to_value(&report.failures)?);
    }
    Ok(Value::Object(metadata))
}

/// Run `body` under a ledger row for `job`.
///
/// # Errors
///
/// Returns [`PipelineError`] only when nothing could be recorded: the gate
/// flag is unreadable or the run row cannot be inserted. A failing body is
/// reported through [`SummaryStatus::Failed`], not as an error.
pub async fn run_job<F, Fut>(
    store: &dyn KeywordStore,
    job: JobName,
    body: F,
) -> Result<JobSummary, PipelineError>
where
    F: FnOnce(i64) -> Fut,
    Fut: Future<Output = Result<JobReport, PipelineError>>,
{
    if !gate_open(store, job).await? {
        let reason = format!("feature flag {} disabled", job.gate_flag().unwrap_or_default());
        let run_id = store.insert_skipped_job_run(job, &reason).await?;
        tracing::info!(job = %job, run_id, reason = %reason, "job skipped");
        let mut summary = JobSummary::empty(job, run_id, SummaryStatus::Skipped);
        summary.metadata.insert("reason".to_string(), Value::String(reason));
        return Ok(summary);
    }

    let run_id = store.insert_job_run(job).await?;
    tracing::info!(job = %job, run_id, "job started");

    match body(run_id).await {
        Ok(report) => {
            let status = if report.has_failures() {
                SummaryStatus::Partial
            } else {
                SummaryStatus::Succeeded
            };
            let metadata = match finalize_metadata(&report) {
                Ok(metadata) => metadata,
                Err(e) => json!({ "errors": report.failures.len(), "encode_error": e.to_string() }),
            };
            if let Err(e) = store
                .finalize_job_run(run_id, JobStatus::Succeeded, report.processed, &metadata)
                .await
            {
                tracing::error!(job = %job, run_id, error = %e, "failed to finalize job run");
            }
            tracing::info!(
                job = %job,
                run_id,
                processed = report.processed,
                errors = report.failures.len(),
                "job finished"
            );
            Ok(JobSummary {
                job,
                run_id,
                status,
                processed: report.processed,
                errors: report.failures.len() as u64,
                failures: report.failures,
                metadata: report.metadata,
                error: None,
            })
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(job = %job, run_id, error = %message, "job failed");
            if let Err(finalize_err) = store
                .finalize_job_run(run_id, JobStatus::Failed, 0, &json!({ "error": message }))
                .await
            {
                tracing::error!(
                    job = %job,
                    run_id,
                    error = %finalize_err,
                    "failed to finalize job run"
                );
            }
            let mut summary = JobSummary::empty(job, run_id, SummaryStatus::Failed);
            summary.error = Some(message);
            Ok(summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::report::FailureScope;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn successful_body_finalizes_once() {
        let store = MemoryStore::new();
        let summary = run_job(&store, JobName::TrendAggregation, |_| async {
            let mut report = JobReport {
                processed: 4,
                ..JobReport::default()
            };
            report.set("sources", 2);
            Ok(report)
        })
        .await
        .unwrap();

        assert_eq!(summary.status, SummaryStatus::Succeeded);
        assert_eq!(summary.processed, 4);
        let run = store.job_run(summary.run_id).unwrap();
        assert_eq!(run.status, JobStatus::Succeeded);
        assert_eq!(run.records_processed, 4);
        assert_eq!(run.metadata["sources"], 2);
        assert!(run.finished_at.is_some());
        assert_eq!(store.job_runs().len(), 1);
    }

    #[tokio::test]
    async fn failures_make_the_run_partial() {
        let store = MemoryStore::new();
        let summary = run_job(&store, JobName::SocialMetrics, |_| async {
            let mut report = JobReport::default();
            report.failures.push(FailureEntry {
                scope: FailureScope::Source,
                key: "tiktok".to_string(),
                error: "timeout".to_string(),
            });
            Ok(report)
        })
        .await
        .unwrap();

        assert_eq!(summary.status, SummaryStatus::Partial);
        assert_eq!(summary.errors, 1);
        let run = store.job_run(summary.run_id).unwrap();
        assert_eq!(run.status, JobStatus::Succeeded);
        assert_eq!(run.metadata["failures"][0]["key"], "tiktok");
    }

    #[tokio::test]
    async fn failing_body_finalizes_failed() {
        let store = MemoryStore::new();
        let summary = run_job(&store, JobName::TrendAggregation, |_| async {
            Err(PipelineError::Store(StoreError::Unavailable("db down".to_string())))
        })
        .await
        .unwrap();

        assert_eq!(summary.status, SummaryStatus::Failed);
        let run = store.job_run(summary.run_id).unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.metadata["error"], "store unavailable: db down");
    }

    #[tokio::test]
    async fn disabled_flag_skips_without_running_the_body() {
        let store = MemoryStore::new();
        store.set_flag("user_telemetry_enabled", false);

        let summary = run_job(&store, JobName::KeywordTelemetry, |_| async {
            Err(PipelineError::Config("body must not run".to_string()))
        })
        .await
        .unwrap();

        assert_eq!(summary.status, SummaryStatus::Skipped);
        assert_eq!(summary.error, None);
        let run = store.job_run(summary.run_id).unwrap();
        assert_eq!(run.status, JobStatus::Skipped);
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn unreadable_flag_aborts_before_any_write() {
        let store = MemoryStore::new();
        store.fail_flag_reads();

        let err = run_job(&store, JobName::KeywordClassification, |_| async {
            Ok(JobReport::default())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::FlagUnreadable { flag: "ai_classification_enabled", .. }
        ));
        assert!(store.job_runs().is_empty());
    }

    #[tokio::test]
    async fn finalize_error_still_returns_the_summary() {
        let store = MemoryStore::new();
        store.fail_finalize();

        let summary = run_job(&store, JobName::SeasonalTagging, |_| async {
            Ok(JobReport::default())
        })
        .await
        .unwrap();

        assert_eq!(summary.status, SummaryStatus::Succeeded);
        assert_eq!(
            store.job_run(summary.run_id).unwrap().status,
            JobStatus::Running
        );
    }
}
