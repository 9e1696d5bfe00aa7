use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::AppState;

fn map_err(err: engine::EngineError) -> StatusCode {
    match err {
        engine::EngineError::JobRunAlreadyTerminal(_) => StatusCode::CONFLICT,
        engine::EngineError::RetryNotEligible(_) => StatusCode::CONFLICT,
        engine::EngineError::Database(db::DbError::NotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /job-run/{id}/kill` (§6).
pub async fn kill(
    Path(job_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .executor
        .kill_job_run(job_run_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(map_err)
}

/// `POST /job-run/{id}/pass` (§6).
pub async fn pass(
    Path(job_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .executor
        .pass_job_run(job_run_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(map_err)
}

/// `POST /job-run/{id}/mark-failed` (§6).
pub async fn mark_failed(
    Path(job_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .executor
        .mark_job_run_failed(job_run_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(map_err)
}

/// `POST /job-run/{id}/retry` (§6).
pub async fn retry(
    Path(job_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .executor
        .retry_job(job_run_id)
        .await
        .map(|()| StatusCode::ACCEPTED)
        .map_err(map_err)
}

/// `POST /job-run/{id}/trigger` (§6).
pub async fn trigger(
    Path(job_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    state
        .executor
        .trigger_job_run(job_run_id)
        .await
        .map(|()| StatusCode::ACCEPTED)
        .map_err(map_err)
}
