//! Hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - environment variables (`QUEREUS_*` prefix)
//!
//! ```bash
//! QUEREUS_MVCC__COLLAPSE_THRESHOLD=32
//! QUEREUS_OPTIMIZER__CACHE_THRESHOLD=8192
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mvcc: MvccConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MVCC in-memory table tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvccConfig {
    /// Number of superseded versions a key chain tolerates before the next
    /// writer collapses it down to the versions still visible to some open
    /// snapshot.
    #[serde(default = "default_collapse_threshold")]
    pub collapse_threshold: usize,
}

/// Optimizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Rows below this threshold are eagerly materialized by a cache node
    /// rather than re-driven from the source on every re-iteration.
    #[serde(default = "default_cache_threshold")]
    pub cache_threshold: usize,

    /// Upper bound on recursive-CTE fixpoint iterations.
    #[serde(default = "default_max_recursion_iterations")]
    pub max_recursion_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// text, json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_collapse_threshold() -> usize {
    16
}

fn default_cache_threshold() -> usize {
    4096
}

fn default_max_recursion_iterations() -> u32 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for MvccConfig {
    fn default() -> Self {
        MvccConfig {
            collapse_threshold: default_collapse_threshold(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            cache_threshold: default_cache_threshold(),
            max_recursion_iterations: default_max_recursion_iterations(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mvcc: MvccConfig::default(),
            optimizer: OptimizerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Merges config.toml, then config.local.toml, then `QUEREUS_*`
    /// environment variables, over the compiled-in defaults.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("QUEREUS_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUEREUS_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_hardcoded_engine_defaults() {
        let config = Config::default();
        assert_eq!(config.mvcc.collapse_threshold, 16);
        assert_eq!(config.optimizer.cache_threshold, 4096);
        assert_eq!(config.optimizer.max_recursion_iterations, 10_000);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[mvcc]"));
        assert!(toml_str.contains("[optimizer]"));
    }
}
