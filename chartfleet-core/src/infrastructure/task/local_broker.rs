//! In-process task broker
//!
//! Runs submitted tasks on the tokio runtime with bounded concurrency.
//! Task state lives in process memory; a multi-node deployment would swap
//! this for a broker backed by the shared cache, behind the same
//! [`TaskBroker`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{TaskBroker, TaskError, TaskExecutor, TaskPayload, TaskSignature, TaskState, TaskStatus};

/// Tokio-based [`TaskBroker`] with a registry of named executors.
pub struct LocalTaskBroker {
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
    states: Arc<RwLock<HashMap<Uuid, TaskState>>>,
    semaphore: Arc<Semaphore>,
    handles: Mutex<Vec<AbortHandle>>,
}

impl LocalTaskBroker {
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
            states: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register the executor for a task name. Submitting an unregistered name
    /// fails at submit time.
    pub async fn register(&self, name: &str, executor: Arc<dyn TaskExecutor>) {
        self.executors
            .write()
            .await
            .insert(name.to_string(), executor);
    }

    /// Abort all in-flight tasks. States of aborted tasks keep their last
    /// recorded status; waiters observe them through the timeout path.
    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;
        info!(tasks = handles.len(), "shutting down local task broker");
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    async fn set_status(
        states: &RwLock<HashMap<Uuid, TaskState>>,
        uuid: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) {
        if let Some(state) = states.write().await.get_mut(&uuid) {
            state.status = status;
            state.error = error;
        }
    }
}

#[async_trait]
impl TaskBroker for LocalTaskBroker {
    async fn submit(&self, payload: TaskPayload) -> Result<TaskSignature, TaskError> {
        let executor = self
            .executors
            .read()
            .await
            .get(&payload.name)
            .cloned()
            .ok_or_else(|| TaskError::UnknownExecutor(payload.name.clone()))?;

        let signature = TaskSignature {
            name: payload.name.clone(),
            uuid: Uuid::new_v4(),
        };

        self.states.write().await.insert(
            signature.uuid,
            TaskState {
                uuid: signature.uuid,
                name: signature.name.clone(),
                error: None,
                created_at: Utc::now(),
                status: TaskStatus::Pending,
            },
        );

        let states = self.states.clone();
        let semaphore = self.semaphore.clone();
        let uuid = signature.uuid;
        let task_name = signature.name.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            Self::set_status(&states, uuid, TaskStatus::Running, None).await;
            debug!(task = %task_name, %uuid, "task started");

            match executor.execute(payload.args).await {
                Ok(()) => {
                    Self::set_status(&states, uuid, TaskStatus::Success, None).await;
                    debug!(task = %task_name, %uuid, "task finished");
                }
                Err(err) => {
                    error!(task = %task_name, %uuid, error = %err, "task failed");
                    Self::set_status(&states, uuid, TaskStatus::Failure, Some(err.to_string()))
                        .await;
                }
            }
        });

        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle.abort_handle());

        Ok(signature)
    }

    async fn state(&self, signature: &TaskSignature) -> Result<Option<TaskState>, TaskError> {
        Ok(self.states.read().await.get(&signature.uuid).cloned())
    }

    async fn purge(&self, signature: &TaskSignature) -> Result<(), TaskError> {
        self.states.write().await.remove(&signature.uuid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::task::AsyncTaskResult;

    struct OkExecutor;

    #[async_trait]
    impl TaskExecutor for OkExecutor {
        async fn execute(&self, _args: serde_json::Value) -> super::super::TaskResult {
            Ok(())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(&self, _args: serde_json::Value) -> super::super::TaskResult {
            Err("boom".into())
        }
    }

    struct SlowExecutor;

    #[async_trait]
    impl TaskExecutor for SlowExecutor {
        async fn execute(&self, _args: serde_json::Value) -> super::super::TaskResult {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn payload(name: &str) -> TaskPayload {
        TaskPayload {
            name: name.to_string(),
            args: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_submit_and_wait_success() {
        let broker = Arc::new(LocalTaskBroker::new(2));
        broker.register("ok", Arc::new(OkExecutor)).await;

        let signature = broker.submit(payload("ok")).await.unwrap();
        let result = AsyncTaskResult::new(broker.clone(), signature)
            .wait(Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_failed_task_surfaces_error() {
        let broker = Arc::new(LocalTaskBroker::new(2));
        broker.register("fail", Arc::new(FailingExecutor)).await;

        let signature = broker.submit(payload("fail")).await.unwrap();
        let err = AsyncTaskResult::new(broker.clone(), signature)
            .wait(Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap_err();

        match err {
            TaskError::Failed { message, .. } => assert_eq!(message, "boom"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_executor_rejected_at_submit() {
        let broker = LocalTaskBroker::new(2);
        let err = broker.submit(payload("nope")).await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownExecutor(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_wait_times_out_without_cancelling() {
        let broker = Arc::new(LocalTaskBroker::new(2));
        broker.register("slow", Arc::new(SlowExecutor)).await;

        let signature = broker.submit(payload("slow")).await.unwrap();
        let err = AsyncTaskResult::new(broker.clone(), signature.clone())
            .wait(Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Timeout { .. }));
        // The task state survives the waiter's timeout.
        let state = broker.state(&signature).await.unwrap().unwrap();
        assert!(!state.is_finished());
    }

    #[tokio::test]
    async fn test_purge_removes_state() {
        let broker = Arc::new(LocalTaskBroker::new(2));
        broker.register("ok", Arc::new(OkExecutor)).await;

        let signature = broker.submit(payload("ok")).await.unwrap();
        AsyncTaskResult::new(broker.clone(), signature.clone())
            .wait(Duration::from_secs(5), Duration::from_millis(10))
            .await
            .unwrap();

        broker.purge(&signature).await.unwrap();
        assert!(broker.state(&signature).await.unwrap().is_none());
    }
}
