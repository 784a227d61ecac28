//! Ferry Runtime
//!
//! Binds the Ferry engine with the sample native library:
//! - [`Host`]: a runtime context with the bridge installed and every library
//!   class exported
//! - [`RuntimeOptions`]: configuration plus command-line overrides
//! - the process-wide converter registry and background worker pool
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry_runtime::{Host, RuntimeOptions};
//!
//! let host = Host::new(&RuntimeOptions::default())?;
//! let calc = host.construct("Calculator")?;
//! let sum = host.context().call_method(&calc, "add", &[2.0.into(), 3.0.into()]);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod host;

pub use error::RuntimeError;
pub use host::{default_registry, descriptors, registry_for, worker_pool, Host, EXPORTS_NAME};

use std::path::Path;

use ferry_engine::BridgeConfig;

/// Host configuration
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Bridge and worker settings
    pub config: BridgeConfig,
}

impl RuntimeOptions {
    /// Options from a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        Ok(RuntimeOptions {
            config: BridgeConfig::load(path)?,
        })
    }

    /// Override the worker thread count (0 = number of CPUs)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.config.workers.threads = threads;
        self
    }
}
