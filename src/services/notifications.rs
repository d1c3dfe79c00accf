//! Notification service
//!
//! Persists notifications and operator alerts, and runs the worker that
//! drains the background task queue into them.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::task_queue::{Delivery, RedisTaskQueue, Task};
use crate::domain::notifications::{
    AlertKind, NotificationResponse, NotificationType, OperatorAlertResponse,
};

const POLL_INTERVAL_MS: u64 = 1000;

/// Create a notification for a user
pub async fn create_notification(
    db: &PgPool,
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: Option<&str>,
    data: Option<serde_json::Value>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let type_str = notification_type.to_string();
    let data = data.unwrap_or(serde_json::json!({}));

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&type_str)
    .bind(title)
    .bind(message)
    .bind(&data)
    .execute(db)
    .await?;

    tracing::info!(
        user_id = %user_id,
        notification_type = %type_str,
        notification_id = %id,
        "Notification created"
    );

    Ok(id)
}

/// Record an alert for the operations team
pub async fn create_operator_alert(
    db: &PgPool,
    job_id: Option<Uuid>,
    kind: AlertKind,
    detail: &str,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO operator_alerts (id, job_id, kind, detail)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(job_id)
    .bind(kind.to_string())
    .bind(detail)
    .execute(db)
    .await?;

    tracing::error!(
        alert_id = %id,
        job_id = ?job_id,
        kind = %kind,
        detail = detail,
        "Operator alert raised"
    );

    Ok(id)
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    job_id: Option<Uuid>,
    kind: String,
    detail: String,
    resolved: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    message: Option<String>,
    data: serde_json::Value,
    is_read: bool,
    read_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<NotificationRow> for NotificationResponse {
    fn from(r: NotificationRow) -> Self {
        Self {
            id: r.id,
            notification_type: r.notification_type,
            title: r.title,
            message: r.message,
            data: r.data,
            is_read: r.is_read,
            read_at: r.read_at,
            created_at: r.created_at,
        }
    }
}

/// A user's notifications, newest first
pub async fn list_notifications(
    db: &PgPool,
    user_id: Uuid,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<NotificationResponse>, i64), sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2::bool = false OR is_read = false)",
    )
    .bind(user_id)
    .bind(unread_only)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, type, title, message, data, is_read, read_at, created_at
        FROM notifications
        WHERE user_id = $1
        AND ($2::bool = false OR is_read = false)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok((rows.into_iter().map(Into::into).collect(), total))
}

/// Mark one notification read. Returns false if the user has no such
/// notification.
pub async fn mark_notification_read(
    db: &PgPool,
    user_id: Uuid,
    notification_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark every unread notification read. Returns how many changed.
pub async fn mark_all_read(db: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = true, read_at = NOW() WHERE user_id = $1 AND is_read = false",
    )
    .bind(user_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

/// Newest alerts first
pub async fn list_operator_alerts(
    db: &PgPool,
    include_resolved: bool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<OperatorAlertResponse>, i64), sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM operator_alerts WHERE $1 OR resolved = FALSE",
    )
    .bind(include_resolved)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, job_id, kind, detail, resolved, created_at
        FROM operator_alerts
        WHERE $1 OR resolved = FALSE
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(include_resolved)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let alerts = rows
        .into_iter()
        .map(|r| OperatorAlertResponse {
            id: r.id,
            job_id: r.job_id,
            kind: r.kind,
            detail: r.detail,
            resolved: r.resolved,
            created_at: r.created_at,
        })
        .collect();

    Ok((alerts, total))
}

/// Apply one task to the database
pub async fn handle_task(db: &PgPool, task: &Task) -> Result<(), sqlx::Error> {
    match task {
        Task::Notify {
            user_id,
            kind,
            title,
            message,
            data,
        } => {
            let data = (!data.is_null()).then(|| data.clone());
            create_notification(db, *user_id, *kind, title, message.as_deref(), data).await?;
        }
        Task::OperatorAlert {
            job_id,
            kind,
            detail,
        } => {
            create_operator_alert(db, *job_id, *kind, detail).await?;
        }
    }
    Ok(())
}

/// Drain the task queue until the process exits.
pub async fn run_task_worker(queue: RedisTaskQueue, db: PgPool, max_attempts: u32) {
    match queue.recover_stalled().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "Requeued tasks left by a previous worker"),
        Err(e) => tracing::error!(error = %e, "Failed to recover stalled tasks"),
    }

    tracing::info!(max_attempts = max_attempts, "Task worker started");

    loop {
        match process_next_task(&queue, &db, max_attempts).await {
            Ok(true) => {
                tracing::trace!("Task processed, checking for next task");
            }
            Ok(false) => {
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Task queue error, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Returns Ok(true) if a task was taken off the queue.
async fn process_next_task(
    queue: &RedisTaskQueue,
    db: &PgPool,
    max_attempts: u32,
) -> Result<bool, super::task_queue::QueueError> {
    let Some(delivery) = queue.dequeue().await? else {
        return Ok(false);
    };

    match handle_task(db, &delivery.task.task).await {
        Ok(()) => {
            queue.complete(&delivery).await?;
            tracing::debug!(task_id = %delivery.task.id, "Task completed");
        }
        Err(e) => settle_failure(queue, db, &delivery, max_attempts, e).await?,
    }

    Ok(true)
}

async fn settle_failure(
    queue: &RedisTaskQueue,
    db: &PgPool,
    delivery: &Delivery,
    max_attempts: u32,
    error: sqlx::Error,
) -> Result<(), super::task_queue::QueueError> {
    let attempts = delivery.task.attempts + 1;

    if attempts >= max_attempts {
        queue.dead_letter(delivery).await?;
        tracing::error!(
            task_id = %delivery.task.id,
            attempts = attempts,
            error = %error,
            "Task dead-lettered"
        );

        // Best effort: the database may be the reason the task failed
        if !matches!(
            delivery.task.task,
            Task::OperatorAlert {
                kind: AlertKind::TaskDeadLettered,
                ..
            }
        ) {
            let detail = format!("task {} failed {} times: {}", delivery.task.id, attempts, error);
            if let Err(e) = create_operator_alert(db, None, AlertKind::TaskDeadLettered, &detail).await {
                tracing::error!(error = %e, "Failed to record dead-letter alert");
            }
        }
    } else {
        queue.retry(delivery).await?;
        tracing::warn!(
            task_id = %delivery.task.id,
            attempts = attempts,
            error = %error,
            "Task failed, re-queued"
        );
    }

    Ok(())
}
