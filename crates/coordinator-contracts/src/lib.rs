//! Wire-level DTOs for the work-queue HTTP facade: `add`/`lease`/`heartbeat`/
//! `finish` request and response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a queued task, mirroring `work_queue.WorkQueue`'s status
/// column (`LIVE`/`LEASED`/`DONE`/`ERROR`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Live,
    Leased,
    Done,
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Live => write!(f, "live"),
            TaskStatus::Leased => write!(f, "leased"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

/// `POST /api/work_queue/:queue_name/add` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddTaskRequest {
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Caller-supplied id; server generates a UUIDv7 when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AddTaskResponse {
    pub task_id: Uuid,
}

/// `POST /api/work_queue/:queue_name/lease` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaseRequest {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_count")]
    pub count: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,
}

fn default_owner() -> String {
    "unknown".to_string()
}

fn default_count() -> i64 {
    1
}

fn default_timeout_secs() -> i64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeasedTask {
    pub task_id: Uuid,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub lease_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaseResponse {
    pub tasks: Vec<LeasedTask>,
}

/// `POST /api/work_queue/:queue_name/heartbeat` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    pub task_id: Uuid,
    pub owner: String,
    pub message: String,
    /// Monotonic per-task counter; a heartbeat with `index` not greater than
    /// the last recorded one is ignored (out-of-order delivery guard).
    pub index: i64,
}

/// `POST /api/work_queue/:queue_name/finish` request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FinishRequest {
    pub task_id: Uuid,
    pub owner: String,
    #[serde(default)]
    pub error: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// One row as returned by `GET /api/work_queue/:queue_name`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<String>,
    pub lease_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
