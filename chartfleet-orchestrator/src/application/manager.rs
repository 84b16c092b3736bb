//! Project lifecycle manager
//!
//! [`ProjectManager`] is the control surface for project operations. Every
//! mutating call shares one spine: load the existing cache entry and enforce
//! the single-flight invariant, submit the operation as a task, overwrite the
//! cache entry with the new task signature, purge the superseded task state
//! (best effort), and optionally block until the new task completes.
//!
//! ```text
//! Caller          ProjectManager        CacheStore        TaskBroker
//!   │                  │                    │                 │
//!   ├─ create() ──────►│── get ────────────►│                 │
//!   │                  │   (busy check)     │                 │
//!   │                  │── submit ────────────────────────────►│
//!   │                  │── save(new sig) ──►│                 │
//!   │                  │── purge(old sig) ─────────────(warn)►│
//!   │◄── Ok / error ───┤   [wait: poll until finished]        │
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use chartfleet_core::infrastructure::task::{
    AsyncTaskResult, TaskBroker, TaskError, TaskPayload, TaskSignature, TaskState,
};

use crate::application::tasks::{
    ADD_RELEASE_TASK, AddReleaseTaskArgs, CREATE_PROJECT_TASK, CreateProjectTaskArgs,
    DELETE_PROJECT_TASK, DeleteProjectTaskArgs, REMOVE_RELEASE_TASK, RemoveReleaseTaskArgs,
    UPGRADE_RELEASE_TASK, UpgradeReleaseTaskArgs, task_payload,
};
use crate::domain::entities::{
    PROJECT_NAME_LABEL, ProjectCache, ProjectInfo, ProjectParams, ReleaseRequest,
};
use crate::domain::services::{ChartRuntime, RuntimeError};
use crate::infrastructure::project_store::{ProjectCacheStore, ProjectStoreError};

/// Timeout applied when the caller passes zero.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Project operation errors. The message strings are a visible contract:
/// upstream layers surface them verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("please wait for the project latest task {signature} finished or timeout")]
    ProjectBusy { signature: TaskSignature },

    #[error("project releases can not be empty")]
    EmptyReleases,

    #[error("release {release} is not found in project {project}")]
    ReleaseNotInProject { release: String, project: String },

    #[error("the release dependency graph has no unique root or contains a cycle")]
    NoRootOrCyclic,

    #[error(transparent)]
    Store(#[from] ProjectStoreError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ProjectError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProjectError::Store(e) if e.is_not_found())
    }
}

/// Lifecycle façade over project operations.
///
/// Construct one at program init and hand clones to consumers; per-project
/// serialization comes from the single-flight guard on the cache entry, so the
/// manager itself is safe to call from many tasks concurrently.
#[derive(Clone)]
pub struct ProjectManager {
    store: Arc<dyn ProjectCacheStore>,
    broker: Arc<dyn TaskBroker>,
    runtime: Arc<dyn ChartRuntime>,
}

impl ProjectManager {
    pub fn new(
        store: Arc<dyn ProjectCacheStore>,
        broker: Arc<dyn TaskBroker>,
        runtime: Arc<dyn ChartRuntime>,
    ) -> Self {
        Self {
            store,
            broker,
            runtime,
        }
    }

    /// Create a project from a bundle of releases.
    pub async fn create_project(
        &self,
        namespace: &str,
        project: &str,
        params: &ProjectParams,
        wait: bool,
        timeout_secs: u64,
    ) -> Result<(), ProjectError> {
        if params.releases.is_empty() {
            return Err(ProjectError::EmptyReleases);
        }
        let timeout_secs = normalize_timeout(timeout_secs);

        let old_cache = self.load_project_cache(namespace, project).await?;
        if let Some(cache) = &old_cache {
            self.ensure_not_busy(cache).await?;
        }

        let payload = task_payload(
            CREATE_PROJECT_TASK,
            &CreateProjectTaskArgs {
                namespace: namespace.to_string(),
                name: project.to_string(),
                project_params: params.clone(),
            },
        )?;
        self.dispatch(namespace, project, old_cache, payload, timeout_secs, wait)
            .await?;

        info!(namespace = %namespace, project = %project, "project create dispatched");
        Ok(())
    }

    /// Tear down a project and all of its releases. Deleting a project that
    /// does not exist succeeds without submitting anything.
    pub async fn delete_project(
        &self,
        namespace: &str,
        project: &str,
        wait: bool,
        timeout_secs: u64,
        delete_pvcs: bool,
    ) -> Result<(), ProjectError> {
        let Some(old_cache) = self.load_project_cache(namespace, project).await? else {
            warn!(namespace = %namespace, project = %project, "project is not found, nothing to delete");
            return Ok(());
        };
        self.ensure_not_busy(&old_cache).await?;

        let timeout_secs = normalize_timeout(timeout_secs);
        let payload = task_payload(
            DELETE_PROJECT_TASK,
            &DeleteProjectTaskArgs {
                namespace: namespace.to_string(),
                name: project.to_string(),
                delete_pvcs,
            },
        )?;
        self.dispatch(
            namespace,
            project,
            Some(old_cache),
            payload,
            timeout_secs,
            wait,
        )
        .await?;

        info!(namespace = %namespace, project = %project, "project delete dispatched");
        Ok(())
    }

    /// Add a single release to a project.
    pub async fn add_release_in_project(
        &self,
        namespace: &str,
        project: &str,
        release: &ReleaseRequest,
        wait: bool,
        timeout_secs: u64,
    ) -> Result<(), ProjectError> {
        let params = ProjectParams {
            releases: vec![release.clone()],
            ..Default::default()
        };
        self.add_releases_in_project(namespace, project, &params, wait, timeout_secs)
            .await
    }

    /// Add a bundle of releases to a project, creating it if necessary.
    pub async fn add_releases_in_project(
        &self,
        namespace: &str,
        project: &str,
        params: &ProjectParams,
        wait: bool,
        timeout_secs: u64,
    ) -> Result<(), ProjectError> {
        if params.releases.is_empty() {
            return Err(ProjectError::EmptyReleases);
        }

        let old_cache = self.load_project_cache(namespace, project).await?;
        if let Some(cache) = &old_cache {
            self.ensure_not_busy(cache).await?;
        }

        let timeout_secs = normalize_timeout(timeout_secs);
        let payload = task_payload(
            ADD_RELEASE_TASK,
            &AddReleaseTaskArgs {
                namespace: namespace.to_string(),
                name: project.to_string(),
                project_params: params.clone(),
            },
        )?;
        self.dispatch(namespace, project, old_cache, payload, timeout_secs, wait)
            .await?;

        info!(namespace = %namespace, project = %project, "add releases dispatched");
        Ok(())
    }

    /// Upgrade a release that already belongs to a project. Upgrading in a
    /// project that does not exist is a warning, not an error.
    pub async fn upgrade_release_in_project(
        &self,
        namespace: &str,
        project: &str,
        release: &ReleaseRequest,
        wait: bool,
        timeout_secs: u64,
    ) -> Result<(), ProjectError> {
        let Some(old_cache) = self.load_project_cache(namespace, project).await? else {
            warn!(namespace = %namespace, project = %project, "project is not found, skipping upgrade");
            return Ok(());
        };
        self.ensure_not_busy(&old_cache).await?;

        let project_info = self.build_project_info(&old_cache).await?;
        if !project_info.releases.iter().any(|r| r.name == release.name) {
            let err = ProjectError::ReleaseNotInProject {
                release: release.name.clone(),
                project: project.to_string(),
            };
            error!("{}", err);
            return Err(err);
        }

        let timeout_secs = normalize_timeout(timeout_secs);
        let payload = task_payload(
            UPGRADE_RELEASE_TASK,
            &UpgradeReleaseTaskArgs {
                namespace: namespace.to_string(),
                project_name: project.to_string(),
                release_params: release.clone(),
            },
        )?;
        self.dispatch(
            namespace,
            project,
            Some(old_cache),
            payload,
            timeout_secs,
            wait,
        )
        .await?;

        info!(
            namespace = %namespace,
            project = %project,
            release = %release.name,
            "release upgrade dispatched"
        );
        Ok(())
    }

    /// Remove a release from a project. Removing a release (or project) that
    /// does not exist succeeds without submitting anything.
    pub async fn remove_release_in_project(
        &self,
        namespace: &str,
        project: &str,
        release_name: &str,
        wait: bool,
        timeout_secs: u64,
        delete_pvcs: bool,
    ) -> Result<(), ProjectError> {
        let Some(old_cache) = self.load_project_cache(namespace, project).await? else {
            warn!(namespace = %namespace, project = %project, "project is not found, skipping remove");
            return Ok(());
        };
        self.ensure_not_busy(&old_cache).await?;

        let project_info = self.build_project_info(&old_cache).await?;
        if !project_info.releases.iter().any(|r| r.name == release_name) {
            warn!(
                namespace = %namespace,
                project = %project,
                release = %release_name,
                "release is not found in project, skipping remove"
            );
            return Ok(());
        }

        let timeout_secs = normalize_timeout(timeout_secs);
        let payload = task_payload(
            REMOVE_RELEASE_TASK,
            &RemoveReleaseTaskArgs {
                namespace: namespace.to_string(),
                name: project.to_string(),
                release_name: release_name.to_string(),
                delete_pvcs,
            },
        )?;
        self.dispatch(
            namespace,
            project,
            Some(old_cache),
            payload,
            timeout_secs,
            wait,
        )
        .await?;

        info!(
            namespace = %namespace,
            project = %project,
            release = %release_name,
            "release remove dispatched"
        );
        Ok(())
    }

    /// Project the live state of one project.
    pub async fn get_project_info(
        &self,
        namespace: &str,
        project: &str,
    ) -> Result<ProjectInfo, ProjectError> {
        let cache = self.store.get(namespace, project).await?;
        self.build_project_info(&cache).await
    }

    /// Project the live state of every project in a namespace, building the
    /// projections concurrently. Any failing projection aborts the call with
    /// the first error observed.
    pub async fn list_projects(&self, namespace: &str) -> Result<Vec<ProjectInfo>, ProjectError> {
        let caches = self.store.list(namespace).await?;

        let mut join_set = JoinSet::new();
        for cache in caches {
            let manager = self.clone();
            join_set.spawn(async move { manager.build_project_info(&cache).await });
        }

        let mut infos = Vec::new();
        let mut first_error: Option<ProjectError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(info)) => infos.push(info),
                Ok(Err(err)) => {
                    error!(namespace = %namespace, error = %err, "failed to build project info");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(namespace = %namespace, error = %join_err, "project info task panicked");
                    first_error
                        .get_or_insert(TaskError::Backend(join_err.to_string()).into());
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(infos)
    }

    /// Fold the cache entry, live release listing and latest task state into
    /// the user-visible projection.
    pub async fn build_project_info(
        &self,
        cache: &ProjectCache,
    ) -> Result<ProjectInfo, ProjectError> {
        let latest_task_state = self.latest_task_state(cache).await;

        let labels = HashMap::from([(PROJECT_NAME_LABEL.to_string(), cache.name.clone())]);
        let releases = self.runtime.list_releases(&cache.namespace, &labels).await?;

        // A failed or in-flight latest task masks release readiness; a
        // successful, absent or unnamed one reveals it.
        let (ready, message) = match &latest_task_state {
            None => project_readiness(&releases),
            Some(state) if state.name.is_empty() => project_readiness(&releases),
            Some(state) if state.is_success() => project_readiness(&releases),
            Some(state) if state.is_failure() => (
                false,
                format!(
                    "the project latest task {} failed: {}",
                    cache.latest_task_signature,
                    state.error.as_deref().unwrap_or_default()
                ),
            ),
            Some(_) => (
                false,
                format!(
                    "please wait for the project latest task {} finished",
                    cache.latest_task_signature
                ),
            ),
        };

        Ok(ProjectInfo {
            project_cache: cache.clone(),
            releases,
            latest_task_state,
            ready,
            message,
        })
    }

    async fn latest_task_state(&self, cache: &ProjectCache) -> Option<TaskState> {
        match self.broker.state(&cache.latest_task_signature).await {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    signature = %cache.latest_task_signature,
                    error = %err,
                    "failed to read latest task state"
                );
                None
            }
        }
    }

    /// Load the cache entry of a project; a missing entry is `None`.
    async fn load_project_cache(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProjectCache>, ProjectError> {
        match self.store.get(namespace, name).await {
            Ok(cache) => Ok(Some(cache)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => {
                error!(namespace = %namespace, project = %name, error = %err, "failed to get project cache");
                Err(err.into())
            }
        }
    }

    /// The single-flight guard: reject the operation while the latest task is
    /// still live.
    async fn ensure_not_busy(&self, cache: &ProjectCache) -> Result<(), ProjectError> {
        let state = self.latest_task_state(cache).await;
        if !cache.is_latest_task_finished_or_timeout(state.as_ref()) {
            let err = ProjectError::ProjectBusy {
                signature: cache.latest_task_signature.clone(),
            };
            error!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    /// Phases 3–5 of every mutating operation: submit, persist the new cache
    /// entry, purge the superseded task state, optionally await completion.
    async fn dispatch(
        &self,
        namespace: &str,
        project: &str,
        old_cache: Option<ProjectCache>,
        payload: TaskPayload,
        timeout_secs: u64,
        wait: bool,
    ) -> Result<(), ProjectError> {
        let signature = self.broker.submit(payload).await?;

        let cache = ProjectCache {
            namespace: namespace.to_string(),
            name: project.to_string(),
            latest_task_signature: signature.clone(),
            latest_task_timeout_sec: timeout_secs,
        };
        if let Err(err) = self.store.save(&cache).await {
            // The submitted task is orphaned; surface the write failure.
            error!(
                namespace = %namespace,
                project = %project,
                error = %err,
                "failed to save project cache"
            );
            return Err(err.into());
        }

        if let Some(old) = old_cache {
            if let Err(err) = self.broker.purge(&old.latest_task_signature).await {
                warn!(
                    signature = %old.latest_task_signature,
                    error = %err,
                    "failed to purge superseded task state"
                );
            }
        }

        if wait {
            AsyncTaskResult::new(self.broker.clone(), signature)
                .wait(Duration::from_secs(timeout_secs), POLL_INTERVAL)
                .await?;
        }
        Ok(())
    }
}

fn normalize_timeout(timeout_secs: u64) -> u64 {
    if timeout_secs == 0 {
        DEFAULT_TIMEOUT_SECS
    } else {
        timeout_secs
    }
}

fn project_readiness(releases: &[crate::domain::entities::ReleaseInfo]) -> (bool, String) {
    if releases.is_empty() {
        return (false, "no release can be found".to_string());
    }
    for release in releases {
        if !release.ready {
            return (false, release.message.clone());
        }
    }
    (true, String::new())
}
