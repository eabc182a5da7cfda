use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use lexyhub_core::JobName;
use lexyhub_pipeline::store::JobRunRecord;
use lexyhub_pipeline::{
    catalogue, run_named_job, JobInfo, JobSummary, KeywordStore, PipelineError, StoreError,
    SummaryStatus,
};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct JobRunsQuery {
    pub limit: Option<i64>,
}

pub(super) async fn list_jobs(
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<JobInfo>>> {
    Json(ApiResponse {
        data: catalogue(),
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) async fn trigger_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job): Path<String>,
) -> Result<Json<ApiResponse<JobSummary>>, ApiError> {
    let job: JobName = job
        .parse()
        .map_err(|_| ApiError::new(req_id.0.clone(), "not_found", format!("unknown job '{job}'")))?;

    if !state.limiter.check(job.as_str()) {
        tracing::warn!(job = %job, "manual trigger rejected by rate limiter");
        return Err(ApiError::new(
            req_id.0,
            "rate_limited",
            format!("too many manual runs of {job}; try again later"),
        ));
    }

    tracing::info!(job = %job, request_id = %req_id.0, "manual job trigger");
    let summary = run_named_job(&state.jobs, job)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), job, &e))?;

    if summary.status == SummaryStatus::Failed {
        return Err(ApiError::new(
            req_id.0,
            "job_failed",
            format!("job {job} failed; see run {}", summary.run_id),
        ));
    }

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_job_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<JobRunsQuery>,
) -> Result<Json<ApiResponse<Vec<JobRunRecord>>>, ApiError> {
    let limit = u32::try_from(normalize_limit(query.limit)).unwrap_or(50);
    let data = state
        .jobs
        .store
        .list_job_runs(limit)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_pipeline_error(request_id: String, job: JobName, error: &PipelineError) -> ApiError {
    tracing::error!(job = %job, error = %error, "job could not be run");
    ApiError::new(request_id, "internal_error", format!("job {job} could not be run"))
}

fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    tracing::error!(error = %error, "store query failed");
    ApiError::new(request_id, "internal_error", "store query failed")
}
