use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AppState;

/// `POST /workflow-run/{id}/kill` — CAS the run to `stopped` (§6).
pub async fn kill(
    Path(workflow_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match state.executor.stop_run(workflow_run_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(engine::EngineError::ConcurrentRunUpdate(_)) => Err(StatusCode::CONFLICT),
        Err(engine::EngineError::Database(db::DbError::NotFound)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(serde::Deserialize, Default)]
pub struct RerunDto {
    /// Explicit JobRun ids to reset; omit to mean "every non-terminal run
    /// plus terminal failures" (spec §4.2).
    pub job_run_ids: Option<Vec<Uuid>>,
}

/// `POST /workflow-run/{id}/rerun` (§6).
pub async fn rerun(
    Path(workflow_run_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<RerunDto>,
) -> Result<StatusCode, StatusCode> {
    match state.executor.rerun_run(workflow_run_id, dto.job_run_ids).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(engine::EngineError::Database(db::DbError::NotFound)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// `GET /workflow-run/{id}/jobs` — all JobRuns belonging to this run (§6).
pub async fn jobs(
    Path(workflow_run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::JobRunRow>>, StatusCode> {
    match db::repository::job_runs::list_job_runs_for_workflow_run(&state.pool, workflow_run_id).await
    {
        Ok(rows) => Ok(Json(rows)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
