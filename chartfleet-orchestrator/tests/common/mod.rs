//! Shared test doubles and fixtures for the orchestrator integration tests.
//!
//! Uses an in-memory `KvStore` and chart runtime so no Redis instance or
//! cluster is needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use chartfleet_core::infrastructure::cache::MemoryKvStore;
use chartfleet_core::infrastructure::task::LocalTaskBroker;

use chartfleet_orchestrator::application::resolver::DependencyResolver;
use chartfleet_orchestrator::application::tasks::{
    ProjectTaskContext, register_project_executors,
};
use chartfleet_orchestrator::domain::entities::{ReleaseInfo, ReleaseRequest};
use chartfleet_orchestrator::domain::services::{ChartRuntime, RuntimeError};
use chartfleet_orchestrator::infrastructure::project_store::{
    KvProjectCacheStore, ProjectCacheStore,
};
use chartfleet_orchestrator::ProjectManager;

// ── In-memory chart runtime (test double) ────────────────────────────────────

#[derive(Default)]
pub struct FakeChartRuntime {
    subcharts: RwLock<HashMap<String, Vec<String>>>,
    releases: RwLock<HashMap<String, Vec<ReleaseInfo>>>,
    install_log: Mutex<Vec<String>>,
    install_error: RwLock<Option<String>>,
    upgrade_error: RwLock<Option<String>>,
    install_delay: RwLock<Option<Duration>>,
}

impl FakeChartRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the subcharts of a chart manifest.
    pub async fn declare_subcharts(&self, chart_name: &str, subcharts: &[&str]) {
        self.subcharts.write().await.insert(
            chart_name.to_string(),
            subcharts.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Put a live release in place without going through install.
    pub async fn seed_release(&self, info: ReleaseInfo) {
        self.releases
            .write()
            .await
            .entry(info.namespace.clone())
            .or_default()
            .push(info);
    }

    pub async fn release(&self, namespace: &str, name: &str) -> Option<ReleaseInfo> {
        self.releases
            .read()
            .await
            .get(namespace)
            .and_then(|releases| releases.iter().find(|r| r.name == name).cloned())
    }

    pub async fn release_names(&self, namespace: &str) -> Vec<String> {
        self.releases
            .read()
            .await
            .get(namespace)
            .map(|releases| releases.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Names in the order `install_release` was called.
    pub async fn install_log(&self) -> Vec<String> {
        self.install_log.lock().await.clone()
    }

    pub async fn set_install_error(&self, message: Option<&str>) {
        *self.install_error.write().await = message.map(|m| m.to_string());
    }

    pub async fn set_upgrade_error(&self, message: Option<&str>) {
        *self.upgrade_error.write().await = message.map(|m| m.to_string());
    }

    pub async fn set_install_delay(&self, delay: Option<Duration>) {
        *self.install_delay.write().await = delay;
    }

    pub async fn set_release_ready(&self, namespace: &str, name: &str, ready: bool, message: &str) {
        if let Some(releases) = self.releases.write().await.get_mut(namespace) {
            if let Some(release) = releases.iter_mut().find(|r| r.name == name) {
                release.ready = ready;
                release.message = message.to_string();
            }
        }
    }

    fn to_release_info(namespace: &str, release: &ReleaseRequest) -> ReleaseInfo {
        ReleaseInfo {
            name: release.name.clone(),
            namespace: namespace.to_string(),
            repo_name: release.repo_name.clone(),
            chart_name: release.chart_name.clone(),
            chart_version: release.chart_version.clone(),
            config_values: release.config_values.clone(),
            dependencies: release.dependencies.clone(),
            release_labels: release.release_labels.clone(),
            ready: true,
            message: String::new(),
        }
    }
}

#[async_trait]
impl ChartRuntime for FakeChartRuntime {
    async fn list_releases(
        &self,
        namespace: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<ReleaseInfo>, RuntimeError> {
        Ok(self
            .releases
            .read()
            .await
            .get(namespace)
            .map(|releases| {
                releases
                    .iter()
                    .filter(|release| {
                        labels
                            .iter()
                            .all(|(k, v)| release.release_labels.get(k) == Some(v))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn auto_dependencies(
        &self,
        _repo_name: &str,
        chart_name: &str,
        _chart_version: &str,
    ) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .subcharts
            .read()
            .await
            .get(chart_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn install_release(
        &self,
        namespace: &str,
        release: &ReleaseRequest,
    ) -> Result<(), RuntimeError> {
        let delay = *self.install_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.install_error.read().await.clone() {
            return Err(RuntimeError(message));
        }

        self.install_log.lock().await.push(release.name.clone());

        let info = Self::to_release_info(namespace, release);
        let mut releases = self.releases.write().await;
        let namespace_releases = releases.entry(namespace.to_string()).or_default();
        namespace_releases.retain(|r| r.name != release.name);
        namespace_releases.push(info);
        Ok(())
    }

    async fn upgrade_release(
        &self,
        namespace: &str,
        release: &ReleaseRequest,
    ) -> Result<(), RuntimeError> {
        if let Some(message) = self.upgrade_error.read().await.clone() {
            return Err(RuntimeError(message));
        }

        let mut releases = self.releases.write().await;
        let namespace_releases = releases
            .get_mut(namespace)
            .ok_or_else(|| RuntimeError(format!("namespace {} has no releases", namespace)))?;
        let current = namespace_releases
            .iter_mut()
            .find(|r| r.name == release.name)
            .ok_or_else(|| RuntimeError(format!("release {} is not installed", release.name)))?;

        current.repo_name = release.repo_name.clone();
        current.chart_name = release.chart_name.clone();
        current.chart_version = release.chart_version.clone();
        current.config_values = release.config_values.clone();
        current.dependencies = release.dependencies.clone();
        for (key, value) in &release.release_labels {
            current.release_labels.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_release(
        &self,
        namespace: &str,
        release_name: &str,
        _delete_pvcs: bool,
    ) -> Result<(), RuntimeError> {
        if let Some(releases) = self.releases.write().await.get_mut(namespace) {
            releases.retain(|r| r.name != release_name);
        }
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn release_request(name: &str, chart_name: &str) -> ReleaseRequest {
    ReleaseRequest {
        name: name.to_string(),
        repo_name: "stable".to_string(),
        chart_name: chart_name.to_string(),
        chart_version: "1.0.0".to_string(),
        ..Default::default()
    }
}

pub fn release_info(namespace: &str, name: &str, chart_name: &str) -> ReleaseInfo {
    ReleaseInfo {
        name: name.to_string(),
        namespace: namespace.to_string(),
        repo_name: "stable".to_string(),
        chart_name: chart_name.to_string(),
        chart_version: "1.0.0".to_string(),
        ready: true,
        ..Default::default()
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub runtime: Arc<FakeChartRuntime>,
    pub broker: Arc<LocalTaskBroker>,
    pub store: Arc<dyn ProjectCacheStore>,
    pub manager: ProjectManager,
}

pub async fn setup() -> Harness {
    let runtime = Arc::new(FakeChartRuntime::new());
    let store: Arc<dyn ProjectCacheStore> =
        Arc::new(KvProjectCacheStore::new(Arc::new(MemoryKvStore::new())));
    let broker = Arc::new(LocalTaskBroker::new(4));
    let resolver = Arc::new(DependencyResolver::new(runtime.clone()));

    register_project_executors(
        &broker,
        ProjectTaskContext {
            store: store.clone(),
            runtime: runtime.clone(),
            resolver,
        },
    )
    .await;

    let manager = ProjectManager::new(store.clone(), broker.clone(), runtime.clone());

    Harness {
        runtime,
        broker,
        store,
        manager,
    }
}
