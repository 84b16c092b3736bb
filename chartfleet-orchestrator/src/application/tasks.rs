//! Project task arguments and executors
//!
//! Each mutating project operation is executed as a named background task.
//! The argument records here are the wire contract between the manager (which
//! submits them) and the executors (which run the chart-level work).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use chartfleet_core::infrastructure::task::{
    LocalTaskBroker, TaskError, TaskExecutor, TaskPayload, TaskResult,
};

use crate::application::resolver::DependencyResolver;
use crate::domain::entities::{
    PROJECT_NAME_LABEL, ProjectParams, ReleaseInfo, ReleaseRequest, build_release_request,
};
use crate::domain::services::ChartRuntime;
use crate::infrastructure::project_store::ProjectCacheStore;

pub const CREATE_PROJECT_TASK: &str = "create-project";
pub const DELETE_PROJECT_TASK: &str = "delete-project";
pub const ADD_RELEASE_TASK: &str = "add-release-in-project";
pub const UPGRADE_RELEASE_TASK: &str = "upgrade-release-in-project";
pub const REMOVE_RELEASE_TASK: &str = "remove-release-in-project";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectTaskArgs {
    pub namespace: String,
    pub name: String,
    pub project_params: ProjectParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProjectTaskArgs {
    pub namespace: String,
    pub name: String,
    pub delete_pvcs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddReleaseTaskArgs {
    pub namespace: String,
    pub name: String,
    pub project_params: ProjectParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeReleaseTaskArgs {
    pub namespace: String,
    pub project_name: String,
    pub release_params: ReleaseRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveReleaseTaskArgs {
    pub namespace: String,
    pub name: String,
    pub release_name: String,
    pub delete_pvcs: bool,
}

/// Encode typed task arguments into a broker payload.
pub fn task_payload<T: Serialize>(name: &str, args: &T) -> Result<TaskPayload, TaskError> {
    let args = serde_json::to_value(args)
        .map_err(|e| TaskError::Backend(format!("failed to encode {} args: {}", name, e)))?;
    Ok(TaskPayload {
        name: name.to_string(),
        args,
    })
}

/// Shared collaborators of the project task executors.
#[derive(Clone)]
pub struct ProjectTaskContext {
    pub store: Arc<dyn ProjectCacheStore>,
    pub runtime: Arc<dyn ChartRuntime>,
    pub resolver: Arc<DependencyResolver>,
}

impl ProjectTaskContext {
    async fn project_releases(
        &self,
        namespace: &str,
        project: &str,
    ) -> Result<Vec<ReleaseInfo>, crate::domain::services::RuntimeError> {
        let labels = std::collections::HashMap::from([(
            PROJECT_NAME_LABEL.to_string(),
            project.to_string(),
        )]);
        self.runtime.list_releases(namespace, &labels).await
    }
}

/// Register every project executor on the broker.
pub async fn register_project_executors(broker: &LocalTaskBroker, context: ProjectTaskContext) {
    broker
        .register(
            CREATE_PROJECT_TASK,
            Arc::new(CreateProjectExecutor {
                context: context.clone(),
            }),
        )
        .await;
    broker
        .register(
            DELETE_PROJECT_TASK,
            Arc::new(DeleteProjectExecutor {
                context: context.clone(),
            }),
        )
        .await;
    broker
        .register(
            ADD_RELEASE_TASK,
            Arc::new(AddReleaseExecutor {
                context: context.clone(),
            }),
        )
        .await;
    broker
        .register(
            UPGRADE_RELEASE_TASK,
            Arc::new(UpgradeReleaseExecutor {
                context: context.clone(),
            }),
        )
        .await;
    broker
        .register(
            REMOVE_RELEASE_TASK,
            Arc::new(RemoveReleaseExecutor { context }),
        )
        .await;
}

fn stamp_project_label(release: &mut ReleaseRequest, project: &str) {
    release
        .release_labels
        .insert(PROJECT_NAME_LABEL.to_string(), project.to_string());
}

struct CreateProjectExecutor {
    context: ProjectTaskContext,
}

#[async_trait]
impl TaskExecutor for CreateProjectExecutor {
    async fn execute(&self, args: Value) -> TaskResult {
        let args: CreateProjectTaskArgs = serde_json::from_value(args)?;
        info!(
            namespace = %args.namespace,
            project = %args.name,
            releases = args.project_params.releases.len(),
            "creating project"
        );

        let ordered = self.context.resolver.install_order(&args.project_params).await?;
        for mut release in ordered {
            stamp_project_label(&mut release, &args.name);
            self.context
                .runtime
                .install_release(&args.namespace, &release)
                .await?;
        }
        Ok(())
    }
}

struct DeleteProjectExecutor {
    context: ProjectTaskContext,
}

#[async_trait]
impl TaskExecutor for DeleteProjectExecutor {
    async fn execute(&self, args: Value) -> TaskResult {
        let args: DeleteProjectTaskArgs = serde_json::from_value(args)?;
        info!(namespace = %args.namespace, project = %args.name, "deleting project");

        let releases = self
            .context
            .project_releases(&args.namespace, &args.name)
            .await?;
        for release in &releases {
            self.context
                .runtime
                .delete_release(&args.namespace, &release.name, args.delete_pvcs)
                .await?;
        }

        // The delete task owns the cache entry's removal.
        match self.context.store.delete(&args.namespace, &args.name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

struct AddReleaseExecutor {
    context: ProjectTaskContext,
}

#[async_trait]
impl TaskExecutor for AddReleaseExecutor {
    async fn execute(&self, args: Value) -> TaskResult {
        let args: AddReleaseTaskArgs = serde_json::from_value(args)?;
        info!(
            namespace = %args.namespace,
            project = %args.name,
            releases = args.project_params.releases.len(),
            "adding releases to project"
        );

        for mut release in args.project_params.releases.clone() {
            // A fresh listing per release so earlier additions of this bundle
            // participate in the wiring of later ones.
            let existing = self
                .context
                .project_releases(&args.namespace, &args.name)
                .await?;

            let affected = self
                .context
                .resolver
                .affected_releases(&existing, &mut release, false)
                .await?;

            stamp_project_label(&mut release, &args.name);
            self.context
                .runtime
                .install_release(&args.namespace, &release)
                .await?;

            for sibling in affected {
                self.context
                    .runtime
                    .upgrade_release(&args.namespace, &sibling)
                    .await?;
            }
        }
        Ok(())
    }
}

struct UpgradeReleaseExecutor {
    context: ProjectTaskContext,
}

#[async_trait]
impl TaskExecutor for UpgradeReleaseExecutor {
    async fn execute(&self, args: Value) -> TaskResult {
        let mut args: UpgradeReleaseTaskArgs = serde_json::from_value(args)?;
        info!(
            namespace = %args.namespace,
            project = %args.project_name,
            release = %args.release_params.name,
            "upgrading release in project"
        );

        let existing = self
            .context
            .project_releases(&args.namespace, &args.project_name)
            .await?;

        let affected = self
            .context
            .resolver
            .affected_releases(&existing, &mut args.release_params, false)
            .await?;

        stamp_project_label(&mut args.release_params, &args.project_name);
        self.context
            .runtime
            .upgrade_release(&args.namespace, &args.release_params)
            .await?;

        for sibling in affected {
            self.context
                .runtime
                .upgrade_release(&args.namespace, &sibling)
                .await?;
        }
        Ok(())
    }
}

struct RemoveReleaseExecutor {
    context: ProjectTaskContext,
}

#[async_trait]
impl TaskExecutor for RemoveReleaseExecutor {
    async fn execute(&self, args: Value) -> TaskResult {
        let args: RemoveReleaseTaskArgs = serde_json::from_value(args)?;
        info!(
            namespace = %args.namespace,
            project = %args.name,
            release = %args.release_name,
            "removing release from project"
        );

        let existing = self
            .context
            .project_releases(&args.namespace, &args.name)
            .await?;

        let Some(mut outgoing) = build_release_request(&existing, &args.release_name) else {
            warn!(
                namespace = %args.namespace,
                project = %args.name,
                release = %args.release_name,
                "release is gone, nothing to remove"
            );
            return Ok(());
        };

        let affected = self
            .context
            .resolver
            .affected_releases(&existing, &mut outgoing, true)
            .await?;
        for sibling in affected {
            self.context
                .runtime
                .upgrade_release(&args.namespace, &sibling)
                .await?;
        }

        self.context
            .runtime
            .delete_release(&args.namespace, &args.release_name, args.delete_pvcs)
            .await?;
        Ok(())
    }
}
