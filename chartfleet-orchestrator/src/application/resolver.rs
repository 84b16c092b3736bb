//! Dependency resolution over release graphs
//!
//! Users declare releases at the chart level; the runtime needs release-level
//! wiring. Two cooperating graph algorithms bridge the gap:
//!
//! - [`DependencyResolver::install_order`] orders a bundle of releases so that
//!   every release is installed after the releases it depends on, wiring the
//!   inferred dependencies along the way.
//! - [`DependencyResolver::affected_releases`] computes which sibling releases
//!   of a live project must be rewritten (and re-upgraded by the caller) when
//!   one release is added, upgraded or removed.
//!
//! Edges always point from dependant to dependency: an edge `A → B` means `A`
//! depends on `B`, so `B` must be realized first.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::application::manager::ProjectError;
use crate::domain::entities::{ProjectParams, ReleaseInfo, ReleaseRequest, build_release_request};
use crate::domain::services::ChartRuntime;

/// Resolves release dependency graphs against the chart runtime's declared
/// subcharts.
pub struct DependencyResolver {
    runtime: Arc<dyn ChartRuntime>,
}

impl DependencyResolver {
    pub fn new(runtime: Arc<dyn ChartRuntime>) -> Self {
        Self { runtime }
    }

    /// Compute a safe install order for a bundle of releases.
    ///
    /// Subchart declarations connect releases of the same bundle unless the
    /// user already declared that dependency explicitly. The bundle must have
    /// exactly one release nothing else depends on; anything else (several
    /// disconnected roots, a cycle) fails with
    /// [`ProjectError::NoRootOrCyclic`]. The returned permutation lists
    /// dependencies before their dependants, with each release's
    /// `dependencies` map augmented by the wiring the graph implies.
    pub async fn install_order(
        &self,
        params: &ProjectParams,
    ) -> Result<Vec<ReleaseRequest>, ProjectError> {
        let mut releases: Vec<ReleaseRequest> = params.releases.clone();

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: Vec<NodeIndex> = Vec::with_capacity(releases.len());
        let mut by_chart: HashMap<String, usize> = HashMap::new();
        for (idx, release) in releases.iter().enumerate() {
            nodes.push(graph.add_node(idx));
            by_chart.insert(release.chart_name.clone(), idx);
        }

        for (idx, release) in releases.iter().enumerate() {
            let subcharts = self
                .runtime
                .auto_dependencies(&release.repo_name, &release.chart_name, &release.chart_version)
                .await?;

            for subchart in subcharts {
                if let Some(&dep_idx) = by_chart.get(&subchart) {
                    if !release.dependencies.contains_key(&subchart) {
                        graph.update_edge(nodes[idx], nodes[dep_idx], ());
                    }
                }
            }
        }

        let root_count = graph.externals(Direction::Incoming).count();
        if root_count != 1 {
            return Err(ProjectError::NoRootOrCyclic);
        }
        let sorted = toposort(&graph, None).map_err(|_| ProjectError::NoRootOrCyclic)?;

        // toposort yields dependants first; installs run the other way round.
        let mut ordered = Vec::with_capacity(releases.len());
        for node in sorted.into_iter().rev() {
            let idx = graph[node];
            let wiring: Vec<(String, String)> = graph
                .neighbors_directed(node, Direction::Outgoing)
                .map(|dep| {
                    let dep_idx = graph[dep];
                    (releases[dep_idx].chart_name.clone(), releases[dep_idx].name.clone())
                })
                .collect();

            let release = &mut releases[idx];
            for (chart_name, release_name) in wiring {
                release.dependencies.insert(chart_name, release_name);
            }
            ordered.push(release.clone());
        }

        Ok(ordered)
    }

    /// Compute the sibling releases whose dependency wiring must be rewritten
    /// when `release` is added/upgraded (`is_remove = false`) or removed
    /// (`is_remove = true`) from a project currently running `existing`.
    ///
    /// On the add path `release.dependencies` is also completed in place with
    /// the project releases it depends on; the incoming release itself is
    /// never part of the returned set, since the caller drives its own write.
    /// The caller must upgrade every returned release for the new wiring to
    /// take effect.
    pub async fn affected_releases(
        &self,
        existing: &[ReleaseInfo],
        release: &mut ReleaseRequest,
        is_remove: bool,
    ) -> Result<Vec<ReleaseRequest>, ProjectError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

        for info in existing {
            ensure_node(&mut graph, &mut nodes, &info.name);
        }
        for info in existing {
            for dep_release in info.dependencies.values() {
                let from = nodes[&info.name];
                let to = ensure_node(&mut graph, &mut nodes, dep_release);
                graph.update_edge(from, to, ());
            }
        }

        let mut affected = Vec::new();

        if !is_remove {
            let incoming = ensure_node(&mut graph, &mut nodes, &release.name);

            // Existing releases whose chart declares the incoming chart as a
            // subchart become its dependants, unless already wired.
            for info in existing {
                let subcharts = self
                    .runtime
                    .auto_dependencies(&info.repo_name, &info.chart_name, &info.chart_version)
                    .await?;
                for subchart in &subcharts {
                    if *subchart == release.chart_name && !info.dependencies.contains_key(subchart)
                    {
                        let from = nodes[&info.name];
                        graph.update_edge(from, incoming, ());
                    }
                }
            }

            // The incoming chart's own subcharts connect it to matching
            // project releases, unless the user wired them explicitly.
            let subcharts = self
                .runtime
                .auto_dependencies(&release.repo_name, &release.chart_name, &release.chart_version)
                .await?;
            for subchart in &subcharts {
                if release.dependencies.contains_key(subchart) {
                    continue;
                }
                for info in existing {
                    if info.chart_name == *subchart {
                        let to = nodes[&info.name];
                        graph.update_edge(incoming, to, ());
                    }
                }
            }

            // Verify acyclicity before mutating any release.
            toposort(&graph, None).map_err(|_| ProjectError::NoRootOrCyclic)?;

            let parents: Vec<String> = graph
                .neighbors_directed(incoming, Direction::Incoming)
                .map(|node| graph[node].clone())
                .collect();
            debug!(release = %release.name, dependants = ?parents, "rewiring upper-stream releases");
            for parent in parents {
                let Some(mut upper) = build_release_request(existing, &parent) else {
                    continue;
                };
                if !upper.dependencies.contains_key(&release.chart_name) {
                    upper
                        .dependencies
                        .insert(release.chart_name.clone(), release.name.clone());
                }
                affected.push(upper);
            }

            let children: Vec<String> = graph
                .neighbors_directed(incoming, Direction::Outgoing)
                .map(|node| graph[node].clone())
                .collect();
            debug!(release = %release.name, dependencies = ?children, "absorbing down-stream releases");
            for child in children {
                let Some(down) = build_release_request(existing, &child) else {
                    continue;
                };
                if !release.dependencies.contains_key(&down.chart_name) {
                    release
                        .dependencies
                        .insert(down.chart_name.clone(), down.name.clone());
                }
            }
        } else {
            toposort(&graph, None).map_err(|_| ProjectError::NoRootOrCyclic)?;

            let Some(&outgoing) = nodes.get(&release.name) else {
                return Ok(affected);
            };

            let parents: Vec<String> = graph
                .neighbors_directed(outgoing, Direction::Incoming)
                .map(|node| graph[node].clone())
                .collect();
            debug!(release = %release.name, dependants = ?parents, "unwiring dependants of removed release");
            for parent in parents {
                let Some(mut upper) = build_release_request(existing, &parent) else {
                    continue;
                };
                upper.remove_dependency(&release.chart_name);
                affected.push(upper);
            }
        }

        Ok(affected)
    }
}

fn ensure_node(
    graph: &mut DiGraph<String, ()>,
    nodes: &mut HashMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    if let Some(&idx) = nodes.get(name) {
        return idx;
    }
    let idx = graph.add_node(name.to_string());
    nodes.insert(name.to_string(), idx);
    idx
}
