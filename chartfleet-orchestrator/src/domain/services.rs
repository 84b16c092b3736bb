//! Orchestrator domain services

use std::collections::HashMap;

use async_trait::async_trait;

use super::entities::{ReleaseInfo, ReleaseRequest};

/// The chart runtime contract consumed by the orchestration core.
///
/// Implementations render charts and drive the cluster API; this crate only
/// decides what to run, in what order, and with which dependency wiring.
#[async_trait]
pub trait ChartRuntime: Send + Sync {
    /// List live releases in a namespace whose labels contain every entry of
    /// `labels`.
    async fn list_releases(
        &self,
        namespace: &str,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<ReleaseInfo>, RuntimeError>;

    /// The subchart names a chart declares in its manifest.
    async fn auto_dependencies(
        &self,
        repo_name: &str,
        chart_name: &str,
        chart_version: &str,
    ) -> Result<Vec<String>, RuntimeError>;

    /// Install a release into a namespace.
    async fn install_release(
        &self,
        namespace: &str,
        release: &ReleaseRequest,
    ) -> Result<(), RuntimeError>;

    /// Upgrade a live release in place.
    async fn upgrade_release(
        &self,
        namespace: &str,
        release: &ReleaseRequest,
    ) -> Result<(), RuntimeError>;

    /// Tear down a release, optionally deleting its persistent volume claims.
    async fn delete_release(
        &self,
        namespace: &str,
        release_name: &str,
        delete_pvcs: bool,
    ) -> Result<(), RuntimeError>;
}

/// Chart runtime transport error, propagated as-is.
#[derive(Debug, thiserror::Error)]
#[error("chart runtime error: {0}")]
pub struct RuntimeError(pub String);
