//! Error types for the acquisition pipeline

use thiserror::Error;

/// Result type alias for daqcore operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Main error type for the acquisition pipeline
#[derive(Error, Debug)]
pub enum DaqError {
    /// I/O errors from output-file writers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration parameter
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the offending configuration field
        message: String,
    },

    /// Client-registry errors (unknown client id, registry closed)
    #[error("client registry error: {message}")]
    Registry {
        /// Description of the registry issue
        message: String,
    },

    /// Run-controller state-transition errors
    #[error("run control error: {message}")]
    RunControl {
        /// Description of the rejected transition
        message: String,
    },
}

impl DaqError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry { message: message.into() }
    }

    /// Create a new run-control error
    pub fn run_control(message: impl Into<String>) -> Self {
        Self::RunControl { message: message.into() }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::DaqError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DaqError::config("missing trigger channel");
        assert!(matches!(err, DaqError::Config { .. }));
    }

    #[test]
    fn test_error_macro() {
        let err = config_error!("bad value: {}", 42);
        assert!(matches!(err, DaqError::Config { .. }));
    }
}
