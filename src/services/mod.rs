//! Service layer modules for background work.
//!
//! The Redis task queue and the notification worker that drains it.

pub mod notifications;
pub mod task_queue;

pub use task_queue::{InMemoryTaskQueue, RedisTaskQueue, Task, TaskQueue};
