// Database models for the work queue (internal, distinct from the wire DTOs
// in coordinator-contracts).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub task_id: Uuid,
    pub queue_name: String,
    pub payload: Value,
    pub content_type: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub owner: Option<String>,
    pub heartbeat: Option<String>,
    pub heartbeat_index: i64,
    pub lease_attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a task to a queue.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub task_id: Uuid,
    pub queue_name: String,
    pub payload: Value,
    pub content_type: Option<String>,
    pub source: Option<String>,
}
