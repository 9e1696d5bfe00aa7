//! `api` crate — the thin HTTP control surface spec §6 describes "for
//! completeness". No auth/session, no Studio UI, no SQL-over-catalog — this
//! exists only to drive the `engine::WorkflowExecutor` state machine and
//! read back JobRun/WorkflowRun rows.
//!
//! Exposes:
//!   POST /workflow/:id/trigger
//!   POST /workflow-run/:id/kill
//!   POST /workflow-run/:id/rerun
//!   GET  /workflow-run/:id/jobs
//!   POST /job-run/:id/kill
//!   POST /job-run/:id/pass
//!   POST /job-run/:id/mark-failed
//!   POST /job-run/:id/retry
//!   POST /job-run/:id/trigger

pub mod handlers;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use db::DbPool;
use engine::WorkflowExecutor;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub executor: Arc<WorkflowExecutor>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/workflow/:id/trigger", post(handlers::workflows::trigger))
        .route("/workflow-run/:id/kill", post(handlers::workflow_runs::kill))
        .route("/workflow-run/:id/rerun", post(handlers::workflow_runs::rerun))
        .route("/workflow-run/:id/jobs", get(handlers::workflow_runs::jobs))
        .route("/job-run/:id/kill", post(handlers::job_runs::kill))
        .route("/job-run/:id/pass", post(handlers::job_runs::pass))
        .route("/job-run/:id/mark-failed", post(handlers::job_runs::mark_failed))
        .route("/job-run/:id/retry", post(handlers::job_runs::retry))
        .route("/job-run/:id/trigger", post(handlers::job_runs::trigger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, pool: DbPool, executor: Arc<WorkflowExecutor>) -> Result<(), std::io::Error> {
    let app = router(AppState { pool, executor });

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
