//! Application configuration for the learning path service.
//!
//! User config lives at `~/.learnpath/learnpath.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LearnPathError, Result};
use crate::types::WeightVector;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "learnpath.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".learnpath";

// ---------------------------------------------------------------------------
// Config structs (matching learnpath.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Document fetching and extraction.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Edge cost heuristics.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Path search defaults and learner adjustment.
    #[serde(default)]
    pub pathfinding: PathfindingConfig,

    /// Graph session registry.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Learner id used when a request does not name one.
    #[serde(default = "default_learner")]
    pub default_learner: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_learner: default_learner(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_learner() -> String {
    "demo".into()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum concurrent fetches within one build.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-URL request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Responses larger than this are skipped.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// How long extracted documents stay cached (0 disables the cache).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cap on co-occurrence pairs emitted per text block.
    #[serde(default = "default_max_pairs_per_block")]
    pub max_pairs_per_block: usize,

    /// Allow localhost/private hosts (local development and tests).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_pairs_per_block: default_max_pairs_per_block(),
            allow_private_hosts: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_max_pairs_per_block() -> usize {
    45
}

/// `[graph]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Cost used for a dimension when no signal is available.
    #[serde(default = "default_neutral_cost")]
    pub neutral_cost: f64,

    /// Lower bound for every cost dimension. Must be positive.
    #[serde(default = "default_min_cost")]
    pub min_cost: f64,

    /// Words per minute used to estimate time-to-learn.
    #[serde(default = "default_reading_wpm")]
    pub reading_wpm: f64,

    /// Multiplier on `prereq_strength` for `related` edges.
    #[serde(default = "default_related_penalty")]
    pub related_penalty: f64,

    /// Words that raise a concept's interest affinity.
    #[serde(default)]
    pub interest_keywords: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            neutral_cost: default_neutral_cost(),
            min_cost: default_min_cost(),
            reading_wpm: default_reading_wpm(),
            related_penalty: default_related_penalty(),
            interest_keywords: Vec::new(),
        }
    }
}

fn default_neutral_cost() -> f64 {
    1.0
}
fn default_min_cost() -> f64 {
    0.05
}
fn default_reading_wpm() -> f64 {
    200.0
}
fn default_related_penalty() -> f64 {
    1.5
}

/// `[pathfinding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfindingConfig {
    /// Weights applied when a request omits `weights`.
    #[serde(default)]
    pub default_weights: WeightVector,

    /// Mastery at or above which a concept counts as already learned.
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,

    /// Factor applied to outgoing edge costs of learned concepts.
    #[serde(default = "default_mastered_discount")]
    pub mastered_discount: f64,

    /// Adjust paths for `server.default_learner` when a request names no learner.
    #[serde(default = "default_apply_default_learner")]
    pub apply_default_learner: bool,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            default_weights: WeightVector::default(),
            mastery_threshold: default_mastery_threshold(),
            mastered_discount: default_mastered_discount(),
            apply_default_learner: default_apply_default_learner(),
        }
    }
}

fn default_mastery_threshold() -> f64 {
    0.9
}
fn default_mastered_discount() -> f64 {
    0.1
}
fn default_apply_default_learner() -> bool {
    true
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Graph sessions kept in memory; the oldest is evicted first.
    #[serde(default = "default_max_graphs")]
    pub max_graphs: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_graphs: default_max_graphs(),
        }
    }
}

fn default_max_graphs() -> usize {
    16
}

impl AppConfig {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        let graph = &self.graph;
        if !(graph.min_cost.is_finite() && graph.min_cost > 0.0) {
            return Err(LearnPathError::config("graph.min_cost must be positive"));
        }
        if !(graph.neutral_cost.is_finite() && graph.neutral_cost >= graph.min_cost) {
            return Err(LearnPathError::config(
                "graph.neutral_cost must be at least graph.min_cost",
            ));
        }
        if !(graph.reading_wpm.is_finite() && graph.reading_wpm > 0.0) {
            return Err(LearnPathError::config("graph.reading_wpm must be positive"));
        }
        if !(graph.related_penalty.is_finite() && graph.related_penalty > 0.0) {
            return Err(LearnPathError::config(
                "graph.related_penalty must be positive",
            ));
        }
        if self.ingest.concurrency == 0 {
            return Err(LearnPathError::config("ingest.concurrency must be at least 1"));
        }
        if self.service.max_graphs == 0 {
            return Err(LearnPathError::config("service.max_graphs must be at least 1"));
        }
        let pf = &self.pathfinding;
        if !(0.0..=1.0).contains(&pf.mastery_threshold) {
            return Err(LearnPathError::config(
                "pathfinding.mastery_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&pf.mastered_discount) {
            return Err(LearnPathError::config(
                "pathfinding.mastered_discount must be within [0, 1]",
            ));
        }
        pf.default_weights
            .validate()
            .map_err(|e| LearnPathError::config(format!("pathfinding.default_weights: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.learnpath/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LearnPathError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.learnpath/learnpath.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LearnPathError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LearnPathError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LearnPathError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LearnPathError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LearnPathError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("mastery_threshold"));
        assert!(toml_str.contains("reading_wpm"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.port, 8000);
        assert_eq!(parsed.ingest.concurrency, 4);
        assert_eq!(parsed.pathfinding.default_weights, WeightVector::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[graph]
interest_keywords = ["python", "graphs"]

[pathfinding]
default_weights = { time = 1.0 }
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.graph.interest_keywords.len(), 2);
        assert_eq!(config.graph.min_cost, 0.05);
        assert_eq!(config.pathfinding.default_weights.time, 1.0);
        assert_eq!(config.pathfinding.default_weights.prereq, 0.25);
        assert_eq!(config.server.default_learner, "demo");
        assert!(config.pathfinding.apply_default_learner);
    }

    #[test]
    fn zero_min_cost_rejected() {
        let mut config = AppConfig::default();
        config.graph.min_cost = 0.0;
        let err = config.validate().expect_err("must reject");
        assert!(err.to_string().contains("min_cost"));
    }

    #[test]
    fn invalid_default_weights_rejected() {
        let mut config = AppConfig::default();
        config.pathfinding.default_weights = WeightVector::new(0.0, 0.0, 0.0, 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("learnpath-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("learnpath.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").expect("write");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.server.port, 9100);

        std::fs::write(&path, "[service]\nmax_graphs = 0\n").expect("write");
        assert!(load_config_from(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
