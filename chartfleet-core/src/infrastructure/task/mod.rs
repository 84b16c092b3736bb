//! Asynchronous task broker
//!
//! Long-running work is submitted to a [`TaskBroker`] which returns an opaque
//! [`TaskSignature`] synchronously and executes the task in the background.
//! Callers that need the result block on an [`AsyncTaskResult`], a polling
//! handle over the broker's task state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod local_broker;

pub use local_broker::LocalTaskBroker;

/// Opaque identifier of a submitted task, issued by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    pub name: String,
    pub uuid: Uuid,
}

impl fmt::Display for TaskSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.uuid)
    }
}

/// Execution status of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failure,
}

/// The broker's view of a submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub uuid: Uuid,
    pub name: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == TaskStatus::Failure
    }

    pub fn is_finished(&self) -> bool {
        self.is_success() || self.is_failure()
    }

    /// Whether the task has been outstanding longer than `timeout_secs`,
    /// measured from its submit time.
    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        now.signed_duration_since(self.created_at) > chrono::Duration::seconds(timeout_secs as i64)
    }
}

/// Task submission record: a registered task name plus its JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub name: String,
    pub args: serde_json::Value,
}

/// Task broker errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task {signature} failed: {message}")]
    Failed {
        signature: TaskSignature,
        message: String,
    },

    #[error("task {signature} did not finish within {timeout_secs}s")]
    Timeout {
        signature: TaskSignature,
        timeout_secs: u64,
    },

    #[error("no executor registered for task {0}")]
    UnknownExecutor(String),

    #[error("task broker error: {0}")]
    Backend(String),
}

/// Result type returned by task executor bodies. The broker records the error
/// text in the task state; waiters receive it verbatim.
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A unit of background work that the broker knows how to run.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, args: serde_json::Value) -> TaskResult;
}

/// Asynchronous task broker interface.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Submit a task for background execution and return its signature.
    async fn submit(&self, payload: TaskPayload) -> Result<TaskSignature, TaskError>;

    /// Look up the current state of a task. `None` when the state has been
    /// purged or never existed.
    async fn state(&self, signature: &TaskSignature) -> Result<Option<TaskState>, TaskError>;

    /// Drop the broker's state for a task. The task itself is not cancelled.
    async fn purge(&self, signature: &TaskSignature) -> Result<(), TaskError>;
}

/// Polling handle over a submitted task.
pub struct AsyncTaskResult {
    broker: Arc<dyn TaskBroker>,
    signature: TaskSignature,
}

impl AsyncTaskResult {
    pub fn new(broker: Arc<dyn TaskBroker>, signature: TaskSignature) -> Self {
        Self { broker, signature }
    }

    /// Block until the task reaches a terminal state or `timeout` elapses,
    /// polling the broker every `poll_interval`.
    ///
    /// A terminal failure surfaces the task's own error message. Timing out
    /// does NOT cancel the underlying task.
    pub async fn wait(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TaskState, TaskError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(state) = self.broker.state(&self.signature).await? {
                if state.is_finished() {
                    if state.is_failure() {
                        return Err(TaskError::Failed {
                            signature: self.signature.clone(),
                            message: state.error.clone().unwrap_or_default(),
                        });
                    }
                    return Ok(state);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(TaskError::Timeout {
                    signature: self.signature.clone(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: TaskStatus, created_at: DateTime<Utc>) -> TaskState {
        TaskState {
            uuid: Uuid::new_v4(),
            name: "test-task".to_string(),
            error: None,
            created_at,
            status,
        }
    }

    #[test]
    fn test_status_predicates() {
        let now = Utc::now();
        assert!(state(TaskStatus::Success, now).is_success());
        assert!(state(TaskStatus::Success, now).is_finished());
        assert!(state(TaskStatus::Failure, now).is_failure());
        assert!(state(TaskStatus::Failure, now).is_finished());
        assert!(!state(TaskStatus::Pending, now).is_finished());
        assert!(!state(TaskStatus::Running, now).is_finished());
    }

    #[test]
    fn test_is_timed_out() {
        let created = Utc::now() - chrono::Duration::seconds(90);
        let running = state(TaskStatus::Running, created);
        assert!(running.is_timed_out(Utc::now(), 60));
        assert!(!running.is_timed_out(Utc::now(), 120));
    }

    #[test]
    fn test_signature_display() {
        let signature = TaskSignature {
            name: "create-project".to_string(),
            uuid: Uuid::new_v4(),
        };
        let rendered = signature.to_string();
        assert!(rendered.starts_with("create-project-"));
        assert!(rendered.contains(&signature.uuid.to_string()));
    }
}
