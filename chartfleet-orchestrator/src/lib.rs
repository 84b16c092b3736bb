//! Chartfleet Orchestrator - Project lifecycle orchestration
//!
//! A *project* is a named, namespace-scoped bundle of chart releases managed
//! as a unit. This crate drives project lifecycle operations through the
//! asynchronous task system, resolves inter-release dependencies, and projects
//! live state into user-visible status.
//!
//! # Architecture
//!
//! ```text
//! chartfleet-orchestrator/
//! ├── application/      # Use cases
//! │   ├── manager.rs    # ProjectManager lifecycle façade
//! │   ├── resolver.rs   # Dependency graph algorithms
//! │   └── tasks.rs      # Task argument records + executors
//! ├── infrastructure/   # External integrations
//! │   └── project_store.rs  # Project cache over the shared KV store
//! └── domain/           # Domain models and the chart runtime contract
//! ```
//!
//! Every mutating operation follows the same spine: validate that the
//! project's latest task is finished or timed out, submit a new task, persist
//! the fresh cache entry, purge the superseded task state, and optionally
//! block until the new task completes.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::manager::{ProjectManager, ProjectError};
pub use application::resolver::DependencyResolver;
