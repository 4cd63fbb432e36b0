//! Axum HTTP surface: `/invoke`, `/status`, `/tasks/{id}`, `/peek`.

use std::future::Future;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    OutcomeTracker, ReadyQueue, RejectReason, Rejection, Scheduler, SchedulerError, Spawn,
    TaskDescriptor, TaskExecutor, TaskId,
};
use crate::runtime::api::{InvokeRequest, InvokeResponse, QueuedView, StatusResponse, TaskView};
use crate::runtime::readiness::Readiness;
use crate::util::clock::now_ms;

/// Errors surfaced by handlers outside the admission path.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No record for the given id.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Scheduler failure.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::TaskNotFound(_) | Self::Scheduler(SchedulerError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Scheduler(SchedulerError::QueueFull(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// HTTP status for a refused submission.
pub const fn rejection_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
        RejectReason::Malformed | RejectReason::DeadlinePassed | RejectReason::Infeasible => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

/// Shared handler state.
pub struct AppState<Q, T, E, S> {
    /// The scheduler every handler talks to.
    pub scheduler: Scheduler<Q, T, E, S>,
    /// Initialization flag reported by `/status`.
    pub readiness: Readiness,
}

impl<Q, T, E, S> Clone for AppState<Q, T, E, S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            readiness: self.readiness.clone(),
        }
    }
}

impl<Q, T, E, S> AppState<Q, T, E, S> {
    /// Bundle a scheduler with a readiness flag.
    pub const fn new(scheduler: Scheduler<Q, T, E, S>, readiness: Readiness) -> Self {
        Self {
            scheduler,
            readiness,
        }
    }
}

/// Build the router with mounted endpoints.
pub fn router<Q, T, E, S>(state: AppState<Q, T, E, S>) -> Router
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    Router::new()
        .route("/invoke", post(invoke::<Q, T, E, S>))
        .route("/status", get(status::<Q, T, E, S>))
        .route("/tasks/{id}", get(task::<Q, T, E, S>))
        .route("/peek", get(peek::<Q, T, E, S>))
        .with_state(state)
}

/// Serve `router(state)` on `listener` until `shutdown` resolves.
pub async fn serve<Q, T, E, S>(
    listener: TcpListener,
    state: AppState<Q, T, E, S>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Admit one request, recording refusals that never reach the controller.
pub fn submit_request<Q, T, E, S>(
    scheduler: &Scheduler<Q, T, E, S>,
    request: InvokeRequest,
) -> Result<InvokeResponse, SchedulerError>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let now = now_ms();
    let admission = match request.into_descriptor(now) {
        Ok(descriptor) => scheduler.submit(descriptor, now)?,
        Err((descriptor, rejection)) => scheduler.reject(descriptor, rejection, now),
    };
    Ok(InvokeResponse::from(&admission))
}

/// POST /invoke
async fn invoke<Q, T, E, S>(
    State(state): State<AppState<Q, T, E, S>>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let response = match body {
        Ok(Json(request)) => submit_request(&state.scheduler, request)?,
        Err(e) => {
            let admission = state.scheduler.reject(
                TaskDescriptor::default(),
                Rejection::malformed(e.body_text()),
                now_ms(),
            );
            InvokeResponse::from(&admission)
        }
    };
    let code = response.reason.map_or(StatusCode::ACCEPTED, rejection_status);
    debug!(task_id = ?response.task_id, status = %code, "invoke handled");
    Ok((code, Json(response)))
}

/// GET /status
async fn status<Q, T, E, S>(State(state): State<AppState<Q, T, E, S>>) -> impl IntoResponse
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let ready = state.readiness.is_ready();
    let body = StatusResponse::new(ready, &state.scheduler.snapshot());
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// GET /tasks/{id}
async fn task<Q, T, E, S>(
    State(state): State<AppState<Q, T, E, S>>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let task_id: TaskId = id.parse().map_err(|_| ApiError::TaskNotFound(id.clone()))?;
    let record = state.scheduler.query(task_id)?;
    Ok(Json(TaskView::from(record)))
}

/// GET /peek
async fn peek<Q, T, E, S>(State(state): State<AppState<Q, T, E, S>>) -> Json<Vec<QueuedView>>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    Json(
        state
            .scheduler
            .peek_queue()
            .iter()
            .map(QueuedView::from)
            .collect(),
    )
}
