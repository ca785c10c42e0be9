//! # nfv-config
//!
//! Configuration management for the nfv workload generator.
//!
//! Loads configuration from:
//! 1. `~/.nfv/config.toml` (global)
//! 2. `.nfv/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! There is no process-wide config instance. Callers load a [`Config`] once at
//! startup and hand it (or values taken from it) to the constructors that need it.

pub mod logging;
pub mod size;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use size::{format_size, parse_size, SizeError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tactic: TacticConfig,
    pub pattern: PatternConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.nfv/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Load project config (.nfv/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::load_file(&project_path)?;
            config.merge(project_config);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Load a single config file without merging or environment overrides.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.nfv/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".nfv/config.toml"))
    }

    /// Project config path: .nfv/config.toml relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".nfv/config.toml")
    }

    /// Merge another config on top of this one.
    ///
    /// Only values that differ from the defaults are taken from `other`.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        if other.tactic.io_size != defaults.tactic.io_size {
            self.tactic.io_size = other.tactic.io_size;
        }
        if other.tactic.data_pattern != defaults.tactic.data_pattern {
            self.tactic.data_pattern = other.tactic.data_pattern;
        }
        if other.tactic.seek_type != defaults.tactic.seek_type {
            self.tactic.seek_type = other.tactic.seek_type;
        }
        if other.tactic.data_check != defaults.tactic.data_check {
            self.tactic.data_check = other.tactic.data_check;
        }

        if other.pattern != defaults.pattern {
            self.pattern = other.pattern;
        }
        if other.lock != defaults.lock {
            self.lock = other.lock;
        }
        if other.logging.level != defaults.logging.level {
            self.logging.level = other.logging.level;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("NFV_IO_SIZE") {
            self.tactic.io_size = size;
        }
        if let Ok(pattern) = std::env::var("NFV_DATA_PATTERN") {
            self.tactic.data_pattern = pattern;
        }
        if let Ok(seek) = std::env::var("NFV_SEEK_TYPE") {
            self.tactic.seek_type = seek;
        }
        if let Ok(check) = std::env::var("NFV_DATA_CHECK") {
            if let Some(flag) = parse_flag(&check) {
                self.tactic.data_check = flag;
            }
        }
        if let Ok(mode) = std::env::var("NFV_LOCK_MODE") {
            self.lock.mode = mode;
        }
        if let Ok(pool) = std::env::var("NFV_POOL_SIZE") {
            self.pattern.pool_size = pool;
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Parse a boolean flag the way the CLI and environment accept them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Default I/O tactic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticConfig {
    /// I/O unit size as a size string ("8k", "1m", ...)
    pub io_size: String,
    /// fixed, random, bit, hex or compress
    pub data_pattern: String,
    /// sequential, reverse or random
    pub seek_type: String,
    /// Record written buffers and verify them after each write pass
    pub data_check: bool,
}

impl Default for TacticConfig {
    fn default() -> Self {
        Self {
            io_size: "8k".to_string(),
            data_pattern: "fixed".to_string(),
            seek_type: "sequential".to_string(),
            data_check: true,
        }
    }
}

/// Parameters for the data pattern generators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub fixed_literal: String,
    pub hex_value: String,
    pub bits: String,
    /// Percentage of every compress chunk filled with the literal
    pub compress_ratio: u8,
    pub compress_chunks: usize,
    pub compress_literal: String,
    /// Size of the random byte pool allocated at startup
    pub pool_size: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            fixed_literal: "content of data pattern is not important".to_string(),
            hex_value: "00".to_string(),
            bits: "00000000".to_string(),
            compress_ratio: 50,
            compress_chunks: 1,
            compress_literal: "abc".to_string(),
            pool_size: "1m".to_string(),
        }
    }
}

/// Byte-range lock defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub mode: String,
    /// start:length:step:stop[:duration], several joined with '+'
    pub strategy: String,
    pub retry_wait_ms: u64,
    pub max_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            mode: "exclusive".to_string(),
            strategy: "0:1:1:0".to_string(),
            retry_wait_ms: 500,
            max_retries: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tactic.io_size, "8k");
        assert_eq!(config.tactic.seek_type, "sequential");
        assert!(config.tactic.data_check);
        assert_eq!(config.pattern.pool_size, "1m");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[tactic]"));
        assert!(toml_str.contains("[pattern]"));
        assert!(toml_str.contains("[lock]"));
        assert!(toml_str.contains("io_size = \"8k\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.tactic, parsed.tactic);
        assert_eq!(config.lock, parsed.lock);
    }

    #[test]
    fn test_merge_keeps_unset_sections() {
        let mut base = Config::default();
        base.lock.max_retries = 3;

        let mut project = Config::default();
        project.tactic.io_size = "4k".to_string();
        base.merge(project);

        assert_eq!(base.tactic.io_size, "4k");
        assert_eq!(base.lock.max_retries, 3);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
