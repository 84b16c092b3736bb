//! Chartfleet Core - Foundation crate for the chartfleet deployment platform
//!
//! This crate provides the shared functionality used by the chartfleet
//! orchestration layer:
//!
//! # Modules
//!
//! - [`config`] — Strongly-typed configuration with file and environment variable support
//! - [`infrastructure`] — Key-value cache backends and the asynchronous task broker
//! - [`logging`] — Structured logging with tracing
//!
//! # Configuration
//!
//! Load configuration from files and environment:
//!
//! ```rust,ignore
//! use chartfleet_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `CHARTFLEET__` prefix with double underscore
//! separators:
//!
//! ```bash
//! CHARTFLEET__CACHE__URL=redis://10.0.0.1:6379
//! CHARTFLEET__TASK__MAX_CONCURRENT_TASKS=16
//! ```

pub mod config;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
