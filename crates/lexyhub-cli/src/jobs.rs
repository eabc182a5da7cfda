//! Job command handlers.
//!
//! Output goes to stdout as JSON so runs can be piped into other tools;
//! logs go to stderr.

use lexyhub_core::{AppConfig, JobName};
use lexyhub_pipeline::{
    catalogue, run_named_job, JobContext, JobSettings, KeywordStore, PgStore, SummaryStatus,
};
use sqlx::PgPool;

pub(crate) fn print_catalogue() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&catalogue())?);
    Ok(())
}

/// Run `job` against Postgres and print its summary.
///
/// # Errors
///
/// Returns an error if the job could not be recorded at all, or if it ran
/// and failed. Partial and skipped runs exit successfully.
pub(crate) async fn run(pool: PgPool, config: &AppConfig, job: JobName) -> anyhow::Result<()> {
    let ctx = JobContext::postgres(pool, JobSettings::from_app_config(config));
    tracing::info!(job = %job, "running job from cli");
    let summary = run_named_job(&ctx, job).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status == SummaryStatus::Failed {
        anyhow::bail!("job {job} failed (run {})", summary.run_id);
    }
    Ok(())
}

pub(crate) async fn print_runs(pool: PgPool, limit: u32) -> anyhow::Result<()> {
    let runs = PgStore::new(pool).list_job_runs(limit.clamp(1, 500)).await?;
    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(())
}
