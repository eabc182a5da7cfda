//! Background job scheduler.
//!
//! Registers every catalogue job on its cron schedule at server startup.
//! Each schedule can be overridden with `<JOB>_CRON`, for example
//! `TREND_AGGREGATION_CRON="0 0 * * * *"`.

use lexyhub_core::JobName;
use lexyhub_pipeline::{run_named_job, JobContext, SummaryStatus};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

fn default_cron(job: JobName) -> &'static str {
    match job {
        JobName::KeywordTelemetry => "0 15 * * * *",
        JobName::SocialMetrics => "0 0 */6 * * *",
        JobName::TrendAggregation => "0 30 */3 * * *",
        JobName::KeywordClassification => "0 45 * * * *",
        JobName::SeasonalTagging => "0 0 5 * * *",
        JobName::ReapStaleRuns => "0 */15 * * * *",
    }
}

/// Environment variable that overrides the schedule of `job`.
fn cron_var(job: JobName) -> String {
    format!("{}_CRON", job.as_str().replace('-', "_").to_ascii_uppercase())
}

/// Cron expression for `job`, preferring a non-blank override from `lookup`.
fn cron_for<F>(job: JobName, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&cron_var(job))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_cron(job).to_string())
}

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(ctx: JobContext) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for job in JobName::ALL {
        register_job(&scheduler, ctx.clone(), job).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_job(
    scheduler: &JobScheduler,
    ctx: JobContext,
    job: JobName,
) -> Result<(), JobSchedulerError> {
    let cron = cron_for(job, |key| std::env::var(key).ok());

    let scheduled = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            tracing::info!(job = %job, "scheduler: starting run");
            run_scheduled(&ctx, job).await;
        })
    })?;

    scheduler.add(scheduled).await?;
    tracing::info!(job = %job, cron = %cron, "scheduler: registered job");
    Ok(())
}

async fn run_scheduled(ctx: &JobContext, job: JobName) {
    match run_named_job(ctx, job).await {
        Ok(summary) if summary.status == SummaryStatus::Failed => {
            tracing::error!(
                job = %job,
                run_id = summary.run_id,
                error = summary.error.as_deref().unwrap_or("unknown"),
                "scheduler: run failed"
            );
        }
        Ok(summary) => {
            tracing::info!(
                job = %job,
                run_id = summary.run_id,
                status = ?summary.status,
                processed = summary.processed,
                errors = summary.errors,
                "scheduler: run complete"
            );
        }
        Err(e) => {
            tracing::error!(job = %job, error = %e, "scheduler: run could not start");
        }
    }
}
