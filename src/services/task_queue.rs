//! Background task queue
//!
//! Side effects that must not hold up or fail a job transition
//! (notifications, operator alerts) are enqueued here after the owning
//! write commits. The worker drains the queue with its own retry policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::notifications::{AlertKind, NotificationType};

const QUEUE_KEY: &str = "cleaning:tasks";
const PROCESSING_KEY: &str = "cleaning:tasks:processing";
const DEAD_LETTER_KEY: &str = "cleaning:tasks:dead";

/// Work item carried by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// In-app notification for one user
    Notify {
        user_id: Uuid,
        kind: NotificationType,
        title: String,
        message: Option<String>,
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Something an operator has to look at
    OperatorAlert {
        job_id: Option<Uuid>,
        kind: AlertKind,
        detail: String,
    },
}

impl Task {
    pub fn notify(
        user_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        Self::Notify {
            user_id,
            kind,
            title: title.into(),
            message,
            data,
        }
    }

    pub fn alert(job_id: Option<Uuid>, kind: AlertKind, detail: impl Into<String>) -> Self {
        Self::OperatorAlert {
            job_id,
            kind,
            detail: detail.into(),
        }
    }
}

/// Task plus delivery bookkeeping, as stored in Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub task: Task,
}

impl QueuedTask {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempts: 0,
            enqueued_at: Utc::now(),
            task,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Producer side of the queue
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError>;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis list queue. Consumers move items into a processing list while
/// they work on them so a crash does not lose the task.
#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: ConnectionManager,
}

/// A dequeued task with the raw payload needed to acknowledge it
#[derive(Debug)]
pub struct Delivery {
    pub task: QueuedTask,
    raw: String,
}

impl RedisTaskQueue {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| anyhow::anyhow!("Failed to create Redis client: {}", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;

        tracing::info!("Task queue connected");
        Ok(Self { conn })
    }

    async fn push(&self, key: &str, task: &QueuedTask) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(task)?;
        conn.lpush::<_, _, ()>(key, &payload).await?;
        Ok(())
    }

    /// Take the oldest task, moving it to the processing list.
    pub async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        let Some(raw) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedTask>(&raw) {
            Ok(task) => Ok(Some(Delivery { task, raw })),
            Err(e) => {
                // Unreadable payloads go straight to the dead letter list
                tracing::error!(error = %e, "Discarding unreadable task payload");
                conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &raw).await?;
                conn.lpush::<_, _, ()>(DEAD_LETTER_KEY, &raw).await?;
                Ok(None)
            }
        }
    }

    /// Acknowledge a finished task.
    pub async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &delivery.raw).await?;
        Ok(())
    }

    /// Put a failed task back with its attempt count bumped.
    pub async fn retry(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut task = delivery.task.clone();
        task.attempts += 1;
        self.push(QUEUE_KEY, &task).await?;
        self.complete(delivery).await
    }

    /// Park a task that will not be retried again.
    pub async fn dead_letter(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(DEAD_LETTER_KEY, &delivery.raw).await?;
        self.complete(delivery).await
    }

    /// Return tasks left in the processing list by a previous worker.
    pub async fn recover_stalled(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let item: Option<String> = conn.rpoplpush(PROCESSING_KEY, QUEUE_KEY).await?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let queued = QueuedTask::new(task);
        self.push(QUEUE_KEY, &queued).await?;
        tracing::debug!(task_id = %queued.id, "Task enqueued");
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Queue that only records what was enqueued
#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }

    pub fn alerts(&self) -> Vec<(Option<Uuid>, AlertKind)> {
        self.tasks
            .lock()
            .iter()
            .filter_map(|t| match t {
                Task::OperatorAlert { job_id, kind, .. } => Some((*job_id, *kind)),
                Task::Notify { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        self.tasks.lock().push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serializes_with_type_tag() {
        let task = Task::alert(None, AlertKind::PayoutFailed, "destination closed");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "operator_alert");
        assert_eq!(value["kind"], "payout_failed");

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }

    #[tokio::test]
    async fn in_memory_queue_records_alerts() {
        let queue = InMemoryTaskQueue::new();
        let job_id = Uuid::new_v4();
        queue
            .enqueue(Task::notify(
                Uuid::new_v4(),
                NotificationType::JobStarted,
                "Cleaning started",
                None,
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        queue
            .enqueue(Task::alert(Some(job_id), AlertKind::CaptureFailed, "card declined"))
            .await
            .unwrap();

        assert_eq!(queue.alerts(), vec![(Some(job_id), AlertKind::CaptureFailed)]);
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.tasks().is_empty());
    }
}
