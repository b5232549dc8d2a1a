//! Shared types, error model, and configuration for the learning path service.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`LearnPathError`]: the unified error type
//! - Domain types ([`GraphId`], [`LearnerId`], [`WeightVector`], [`IngestWarning`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GraphConfig, IngestConfig, PathfindingConfig, ServerConfig, ServiceConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrorKind, LearnPathError, Result};
pub use types::{GraphId, IngestWarning, LearnerId, WeightVector, normalize_label};
