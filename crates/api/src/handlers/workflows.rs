use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;

#[derive(Serialize)]
pub struct TriggerResponse {
    pub workflow_run_id: Uuid,
}

/// `POST /workflow/{id}/trigger` — starts a new WorkflowRun (§6).
pub async fn trigger(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TriggerResponse>), StatusCode> {
    match state.executor.start_run(workflow_id).await {
        Ok(workflow_run_id) => Ok((StatusCode::ACCEPTED, Json(TriggerResponse { workflow_run_id }))),
        Err(engine::EngineError::WorkflowNotOnline(_)) => Err(StatusCode::CONFLICT),
        Err(engine::EngineError::NonTerminalRunExists(_)) => Err(StatusCode::CONFLICT),
        Err(engine::EngineError::Database(db::DbError::NotFound)) => Err(StatusCode::NOT_FOUND),
        Err(engine::EngineError::Dag(_)) => Err(StatusCode::UNPROCESSABLE_ENTITY),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
