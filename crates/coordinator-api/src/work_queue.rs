// Work-queue HTTP routes: add / lease / heartbeat / finish / list.
//
// Per-queue scoping, task_id conflict on re-add, owner-checked
// heartbeat/finish. AppState carries the shared pool; handlers map storage
// errors to status codes with `.map_err(|e| { tracing::error!(...); ... })`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use coordinator_contracts::{
    AddTaskRequest, AddTaskResponse, FinishRequest, HeartbeatRequest, LeaseRequest, LeaseResponse,
    LeasedTask, SuccessResponse, TaskStatus, TaskSummary,
};
use coordinator_storage::{CreateTask, Database, StorageError};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

#[derive(Debug, Deserialize)]
pub struct ListQueueParams {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/work_queue/:queue_name", get(list_queue))
        .route("/api/work_queue/:queue_name/add", post(add_task))
        .route("/api/work_queue/:queue_name/lease", post(lease_tasks))
        .route("/api/work_queue/:queue_name/heartbeat", post(heartbeat))
        .route("/api/work_queue/:queue_name/finish", post(finish))
        .with_state(state)
}

fn map_storage_error(e: StorageError) -> StatusCode {
    match e {
        StorageError::AlreadyExists => StatusCode::CONFLICT,
        StorageError::NotFound => StatusCode::NOT_FOUND,
        StorageError::NotOwner => StatusCode::CONFLICT,
        StorageError::Database(err) => {
            tracing::error!(error = %err, "work_queue database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `POST /api/work_queue/:queue_name/add` — adds a task. A caller-supplied
/// `task_id` that already exists on this queue is a conflict, not a silent
/// duplicate.
#[utoipa::path(
    post,
    path = "/api/work_queue/{queue_name}/add",
    params(("queue_name" = String, Path, description = "Queue name")),
    request_body = AddTaskRequest,
    responses(
        (status = 201, description = "Task added", body = AddTaskResponse),
        (status = 409, description = "task_id already exists on this queue"),
        (status = 500, description = "Internal server error")
    ),
    tag = "work_queue"
)]
pub async fn add_task(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<AddTaskRequest>,
) -> Result<(StatusCode, Json<AddTaskResponse>), StatusCode> {
    let task_id = req.task_id.unwrap_or_else(Uuid::now_v7);
    let row = state
        .db
        .add_task(CreateTask {
            task_id,
            queue_name,
            payload: req.payload,
            content_type: req.content_type,
            source: req.source,
        })
        .await
        .map_err(map_storage_error)?;

    tracing::info!(task_id = %row.task_id, "task added");
    Ok((StatusCode::CREATED, Json(AddTaskResponse { task_id: row.task_id })))
}

/// `POST /api/work_queue/:queue_name/lease` — atomically leases up to
/// `count` LIVE tasks to `owner`, reclaiming any expired leases first.
#[utoipa::path(
    post,
    path = "/api/work_queue/{queue_name}/lease",
    params(("queue_name" = String, Path, description = "Queue name")),
    request_body = LeaseRequest,
    responses(
        (status = 200, description = "Leased tasks (possibly empty)", body = LeaseResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "work_queue"
)]
pub async fn lease_tasks(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<LeaseRequest>,
) -> Result<Json<LeaseResponse>, StatusCode> {
    let rows = state
        .db
        .lease_tasks(&queue_name, &req.owner, req.count, req.timeout_secs)
        .await
        .map_err(map_storage_error)?;

    let tasks = rows
        .into_iter()
        .map(|row| LeasedTask {
            task_id: row.task_id,
            payload: row.payload,
            content_type: row.content_type,
            lease_expires_at: row.lease_expires_at.unwrap_or_else(chrono::Utc::now),
        })
        .collect();

    Ok(Json(LeaseResponse { tasks }))
}

/// `POST /api/work_queue/:queue_name/heartbeat` — extends a lease and
/// records progress, subject to an ownership check and the monotonic-index
/// out-of-order guard.
#[utoipa::path(
    post,
    path = "/api/work_queue/{queue_name}/heartbeat",
    params(("queue_name" = String, Path, description = "Queue name")),
    request_body = HeartbeatRequest,
    responses(
        (status = 200, description = "Heartbeat recorded (or ignored as stale)", body = SuccessResponse),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is not leased by the caller"),
        (status = 500, description = "Internal server error")
    ),
    tag = "work_queue"
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<SuccessResponse>, StatusCode> {
    state
        .db
        .heartbeat_task(&queue_name, req.task_id, &req.owner, &req.message, req.index, 60)
        .await
        .map_err(map_storage_error)?;

    Ok(Json(SuccessResponse::ok()))
}

/// `POST /api/work_queue/:queue_name/finish` — marks a task DONE or ERROR.
/// Finishing a task not leased by the caller is rejected.
#[utoipa::path(
    post,
    path = "/api/work_queue/{queue_name}/finish",
    params(("queue_name" = String, Path, description = "Queue name")),
    request_body = FinishRequest,
    responses(
        (status = 200, description = "Task finished", body = SuccessResponse),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is not leased by the caller"),
        (status = 500, description = "Internal server error")
    ),
    tag = "work_queue"
)]
pub async fn finish(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Json(req): Json<FinishRequest>,
) -> Result<Json<SuccessResponse>, StatusCode> {
    state
        .db
        .finish_task(&queue_name, req.task_id, &req.owner, req.error)
        .await
        .map_err(map_storage_error)?;

    Ok(Json(SuccessResponse::ok()))
}

/// `GET /api/work_queue/:queue_name` — lists recent tasks for operational
/// visibility.
#[utoipa::path(
    get,
    path = "/api/work_queue/{queue_name}",
    params(
        ("queue_name" = String, Path, description = "Queue name"),
        ("limit" = Option<i64>, Query, description = "Max rows to return (default 50)")
    ),
    responses(
        (status = 200, description = "Recent tasks on this queue", body = Vec<TaskSummary>),
        (status = 500, description = "Internal server error")
    ),
    tag = "work_queue"
)]
pub async fn list_queue(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Query(params): Query<ListQueueParams>,
) -> Result<Json<Vec<TaskSummary>>, StatusCode> {
    let rows = state
        .db
        .list_tasks(&queue_name, params.limit)
        .await
        .map_err(map_storage_error)?;

    let tasks = rows
        .into_iter()
        .map(|row| TaskSummary {
            task_id: row.task_id,
            status: parse_status(&row.status),
            owner: row.owner,
            heartbeat: row.heartbeat,
            lease_attempts: row.lease_attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(Json(tasks))
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "leased" => TaskStatus::Leased,
        "done" => TaskStatus::Done,
        "error" => TaskStatus::Error,
        _ => TaskStatus::Live,
    }
}
