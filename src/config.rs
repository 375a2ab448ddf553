//! Profiler configuration
//!
//! Every list the classifier, resolver and normalizer consult lives here so
//! new tools, noise patterns and libraries can be added from a TOML file
//! without recompiling.
//!
//! # Example
//! ```
//! use cmdprof::config::ProfilerConfig;
//!
//! let config = ProfilerConfig::default();
//! assert_eq!(config.timeout_secs, 300);
//! assert!(config.managed_tools.contains("yolo"));
//! ```

use crate::origin::{default_rules, OriginRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Thresholds and patterns used by the sample normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Synthetic origins (`<string>`, `~`) are kept only above this cost (seconds)
    pub synthetic_epsilon: f64,

    /// Global noise floor on cumulative time (seconds)
    pub min_cumulative: f64,

    /// Substrings of symbol or origin that mark bootstrap machinery
    pub noise_patterns: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            synthetic_epsilon: 0.001,
            min_cumulative: 0.001,
            noise_patterns: [
                "<module>",
                "__import__",
                "_handle_fromlist",
                "get_code",
                "_find_and_load",
                "_jit_internal",
                "lazy",
                "_dynamo",
                "_ops",
                "triton_kernel",
                "importlib",
                "marshal",
                "compile_bytecode",
                "__build_class__",
                "create_dynamic",
                "open_code",
                "genexpr",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

fn string_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Top-level profiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Exact interpreter program names (`python`, `python3`)
    pub interpreter_names: BTreeSet<String>,

    /// Program name suffixes that also denote an interpreter (`venv/bin/python`)
    pub interpreter_suffixes: Vec<String>,

    /// Extensions of directly runnable managed-language sources, without the dot
    pub script_extensions: BTreeSet<String>,

    /// Program names known to launch managed code
    pub managed_tools: BTreeSet<String>,

    /// Substrings an interpreter directive (`#!...`) must contain
    pub directive_markers: Vec<String>,

    /// Interpreter used for bare scripts and tools without a usable directive
    pub default_interpreter: String,

    /// Also run opaque commands through the resolution chain
    pub resolve_unknown: bool,

    /// Hard limit on the profiled command's wall time
    pub timeout_secs: u64,

    /// Parent directory for per-run scratch directories (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    pub normalize: NormalizeConfig,

    /// Origin rules, consulted in order
    pub origins: Vec<OriginRule>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            interpreter_names: string_set(&["python", "python3"]),
            interpreter_suffixes: vec!["python".to_string()],
            script_extensions: string_set(&["py"]),
            managed_tools: string_set(&["yolo", "pip", "pytest", "black", "flake8"]),
            directive_markers: vec!["python".to_string()],
            default_interpreter: "python3".to_string(),
            resolve_unknown: false,
            timeout_secs: 300,
            scratch_dir: None,
            normalize: NormalizeConfig::default(),
            origins: default_rules(),
        }
    }
}

impl ProfilerConfig {
    /// Load a configuration file; omitted fields keep their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.default_interpreter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_interpreter must not be empty".to_string(),
            ));
        }

        let thresholds = [
            ("normalize.synthetic_epsilon", self.normalize.synthetic_epsilon),
            ("normalize.min_cumulative", self.normalize.min_cumulative),
        ];
        for (name, value) in thresholds {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be >= 0, got {}",
                    name, value
                )));
            }
        }

        for rule in &self.origins {
            if rule.package.is_empty() || rule.package.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "origin package must be a single directory name, got {:?}",
                    rule.package
                )));
            }
            if let Some(min) = rule.min_cumulative {
                if min.is_nan() || min < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "origin '{}' min_cumulative must be >= 0, got {}",
                        rule.package, min
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
