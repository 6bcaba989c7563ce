// src/config/mod.rs

//! Scheduler configuration.
//!
//! - [`model`] holds the TOML-backed data model and the validated
//!   [`SchedulerConfig`].
//! - [`loader`] reads a config file from disk.
//! - [`validate`] turns raw sections into a validated config.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{RawConfigFile, RawSchedulerConfig, SchedulerConfig, default_max_concurrency};
