//! Runtime error types.

use ferry_engine::ConfigError;

/// Errors that can occur while setting up a host.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File I/O or thread spawn error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
