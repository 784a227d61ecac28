//! Error types for the Ferry SDK

/// Result type for native calls
pub type AbiResult<T> = Result<T, NativeError>;

/// Native library error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Invalid argument
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Method or property index outside the descriptor
    #[error("No member at index {0}")]
    UnknownMember(usize),

    /// The native operation itself failed
    #[error("Invocation failed: {0}")]
    InvocationFailed(String),

    /// Generic failure
    #[error("{0}")]
    Other(String),
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::Other(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::Other(s.to_string())
    }
}
