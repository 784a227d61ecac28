//! Bridge configuration (ferry.toml)

use std::path::Path;
use std::time::Duration;

use ferry_sdk::TypeId;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A type name that is neither built in nor registered
    #[error("Unknown type name in config: {0}")]
    UnknownType(String),
}

/// Full configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Conversion settings
    #[serde(default)]
    pub bridge: ConversionConfig,

    /// Background worker settings
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// Conversion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionConfig {
    /// Buffers this large or larger convert to `undefined`
    #[serde(default = "default_max_external_buffer_len")]
    pub max_external_buffer_len: usize,

    /// Property types that foreign code may not assign
    #[serde(default = "default_dynamic_types")]
    pub dynamic_types: Vec<String>,
}

fn default_max_external_buffer_len() -> usize {
    i32::MAX as usize
}

fn default_dynamic_types() -> Vec<String> {
    vec!["variant".to_string()]
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_external_buffer_len: default_max_external_buffer_len(),
            dynamic_types: default_dynamic_types(),
        }
    }
}

/// Background worker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Worker thread count (0 = number of CPUs)
    #[serde(default)]
    pub threads: usize,

    /// Per-worker wait at shutdown before the thread is detached
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    /// Effective thread count
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Shutdown wait as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl BridgeConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Resolve the configured dynamic type names to ids
    pub fn dynamic_type_ids(&self) -> Result<FxHashSet<TypeId>, ConfigError> {
        self.bridge
            .dynamic_types
            .iter()
            .map(|name| TypeId::lookup(name).ok_or_else(|| ConfigError::UnknownType(name.clone())))
            .collect()
    }
}
