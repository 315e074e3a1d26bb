// Repository layer for the work queue: a thin wrapper over a Postgres pool
// plus a handful of pure transition guards factored out so the lease /
// heartbeat / finish state machine is unit-testable without a database.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateTask, TaskRow};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("task already exists")]
    AlreadyExists,
    #[error("task not found")]
    NotFound,
    #[error("task is not owned by the caller")]
    NotOwner,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Whether a lease has expired as of `now`, reverting its task to LIVE and
/// making it eligible for another `lease` call.
pub fn lease_has_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => expires_at <= now,
        None => false,
    }
}

/// Guards a heartbeat: the task must currently be LEASED by `owner`, and
/// the incoming `index` must be strictly greater than the last recorded one
/// — an out-of-order heartbeat is accepted as a no-op, not an error.
pub fn accepts_heartbeat(
    status: &str,
    task_owner: Option<&str>,
    owner: &str,
    last_index: i64,
    incoming_index: i64,
) -> Result<bool, StorageError> {
    if status != "leased" || task_owner != Some(owner) {
        return Err(StorageError::NotOwner);
    }
    Ok(incoming_index > last_index)
}

/// Guards a finish: the task must currently be LEASED by `owner`.
pub fn accepts_finish(status: &str, task_owner: Option<&str>, owner: &str) -> Result<(), StorageError> {
    if status != "leased" || task_owner != Some(owner) {
        return Err(StorageError::NotOwner);
    }
    Ok(())
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_url(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            StorageError::Database(sqlx::Error::Migrate(Box::new(e)))
        })
    }

    /// Adds a task to a queue. A caller-supplied `task_id` that already
    /// exists on that queue is a conflict, not a silent duplicate.
    pub async fn add_task(&self, input: CreateTask) -> Result<TaskRow, StorageError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO work_queue (task_id, queue_name, payload, content_type, source, status)
            VALUES ($1, $2, $3, $4, $5, 'live')
            ON CONFLICT (task_id, queue_name) DO NOTHING
            RETURNING task_id, queue_name, payload, content_type, source, status, owner,
                      heartbeat, heartbeat_index, lease_attempts, lease_expires_at,
                      created_at, updated_at
            "#,
        )
        .bind(input.task_id)
        .bind(&input.queue_name)
        .bind(&input.payload)
        .bind(&input.content_type)
        .bind(&input.source)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StorageError::AlreadyExists)
    }

    /// Leases up to `count` LIVE tasks on `queue_name` for `owner`, with a
    /// lease expiring `timeout_secs` seconds out. Expired leases are
    /// reclaimed to LIVE first so they become immediately re-leasable.
    pub async fn lease_tasks(
        &self,
        queue_name: &str,
        owner: &str,
        count: i64,
        timeout_secs: i64,
    ) -> Result<Vec<TaskRow>, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE work_queue
            SET status = 'live', owner = NULL, lease_expires_at = NULL
            WHERE queue_name = $1 AND status = 'leased' AND lease_expires_at <= now()
            "#,
        )
        .bind(queue_name)
        .execute(&mut *tx)
        .await?;

        let expires_at = Utc::now() + ChronoDuration::seconds(timeout_secs);
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE work_queue
            SET status = 'leased', owner = $1, lease_expires_at = $2,
                lease_attempts = lease_attempts + 1
            WHERE task_id IN (
                SELECT task_id FROM work_queue
                WHERE queue_name = $3 AND status = 'live'
                ORDER BY created_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING task_id, queue_name, payload, content_type, source, status, owner,
                      heartbeat, heartbeat_index, lease_attempts, lease_expires_at,
                      created_at, updated_at
            "#,
        )
        .bind(owner)
        .bind(expires_at)
        .bind(queue_name)
        .bind(count)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows)
    }

    /// Updates a task's heartbeat message and extends its lease, subject to
    /// the ownership and monotonic-index guards in [`accepts_heartbeat`].
    pub async fn heartbeat_task(
        &self,
        queue_name: &str,
        task_id: Uuid,
        owner: &str,
        message: &str,
        index: i64,
        timeout_secs: i64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, queue_name, payload, content_type, source, status, owner,
                   heartbeat, heartbeat_index, lease_attempts, lease_expires_at,
                   created_at, updated_at
            FROM work_queue
            WHERE task_id = $1 AND queue_name = $2
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .bind(queue_name)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::NotFound)?;

        if !accepts_heartbeat(&row.status, row.owner.as_deref(), owner, row.heartbeat_index, index)? {
            return Ok(());
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(timeout_secs);
        sqlx::query(
            r#"
            UPDATE work_queue
            SET heartbeat = $1, heartbeat_index = $2, lease_expires_at = $3
            WHERE task_id = $4 AND queue_name = $5
            "#,
        )
        .bind(message)
        .bind(index)
        .bind(expires_at)
        .bind(task_id)
        .bind(queue_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Marks a task DONE or ERROR, subject to the ownership guard in
    /// [`accepts_finish`].
    pub async fn finish_task(
        &self,
        queue_name: &str,
        task_id: Uuid,
        owner: &str,
        error: bool,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, queue_name, payload, content_type, source, status, owner,
                   heartbeat, heartbeat_index, lease_attempts, lease_expires_at,
                   created_at, updated_at
            FROM work_queue
            WHERE task_id = $1 AND queue_name = $2
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .bind(queue_name)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::NotFound)?;

        accepts_finish(&row.status, row.owner.as_deref(), owner)?;

        let status = if error { "error" } else { "done" };
        sqlx::query("UPDATE work_queue SET status = $1 WHERE task_id = $2 AND queue_name = $3")
            .bind(status)
            .bind(task_id)
            .bind(queue_name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Lists the most recently created tasks on a queue, for operational
    /// visibility.
    pub async fn list_tasks(&self, queue_name: &str, limit: i64) -> Result<Vec<TaskRow>, StorageError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT task_id, queue_name, payload, content_type, source, status, owner,
                   heartbeat, heartbeat_index, lease_attempts, lease_expires_at,
                   created_at, updated_at
            FROM work_queue
            WHERE queue_name = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(queue_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
