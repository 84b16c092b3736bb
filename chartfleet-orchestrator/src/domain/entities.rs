//! Orchestrator domain entities

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chartfleet_core::infrastructure::task::{TaskSignature, TaskState};

/// Label key associating a release with its parent project. Part of the wire
/// contract with the chart runtime; must match exactly on both sides.
pub const PROJECT_NAME_LABEL: &str = "transwarp.projectName";

/// Canonical record of a project's existence, persisted in the shared cache.
///
/// Exactly one task signature is live per project at any time; writes are
/// last-write-wins under the manager's single-flight guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCache {
    pub namespace: String,
    pub name: String,
    pub latest_task_signature: TaskSignature,
    pub latest_task_timeout_sec: u64,
}

impl ProjectCache {
    /// The single-flight guard predicate: the project accepts a new task when
    /// its latest task has no live state, has reached a terminal status, or
    /// has been outstanding longer than its own timeout.
    pub fn is_latest_task_finished_or_timeout(&self, latest_state: Option<&TaskState>) -> bool {
        match latest_state {
            None => true,
            Some(state) => {
                state.is_finished() || state.is_timed_out(Utc::now(), self.latest_task_timeout_sec)
            }
        }
    }
}

/// User-supplied description of a project: releases to instantiate plus
/// configuration values shared by all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectParams {
    #[serde(default)]
    pub common_values: Map<String, Value>,
    #[serde(default)]
    pub releases: Vec<ReleaseRequest>,
}

/// User-supplied release spec.
///
/// `dependencies` maps a chart name to the release name that satisfies it;
/// entries declared by the user are respected, the resolver only augments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub name: String,
    pub repo_name: String,
    pub chart_name: String,
    pub chart_version: String,
    #[serde(default)]
    pub config_values: Map<String, Value>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub release_labels: HashMap<String, String>,
}

impl ReleaseRequest {
    /// Remove the dependency entry keyed by `chart_name`, if any.
    pub fn remove_dependency(&mut self, chart_name: &str) {
        self.dependencies.remove(chart_name);
    }
}

/// Observed state of a live release, as reported by the chart runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub repo_name: String,
    pub chart_name: String,
    pub chart_version: String,
    #[serde(default)]
    pub config_values: Map<String, Value>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub release_labels: HashMap<String, String>,
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

/// Project a live release back into a request suitable for re-submission.
///
/// Returns `None` when the named release is not part of `releases`; callers
/// skip dependency edges that lead outside the project.
pub fn build_release_request(releases: &[ReleaseInfo], release_name: &str) -> Option<ReleaseRequest> {
    releases
        .iter()
        .find(|info| info.name == release_name)
        .map(|info| ReleaseRequest {
            name: info.name.clone(),
            repo_name: info.repo_name.clone(),
            chart_name: info.chart_name.clone(),
            chart_version: info.chart_version.clone(),
            config_values: info.config_values.clone(),
            dependencies: info.dependencies.clone(),
            release_labels: info.release_labels.clone(),
        })
}

/// Computed projection of a project's state; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_cache: ProjectCache,
    pub releases: Vec<ReleaseInfo>,
    pub latest_task_state: Option<TaskState>,
    pub ready: bool,
    pub message: String,
}
