//! Error types for OpenSuite

use thiserror::Error;

/// OpenSuite error type
#[derive(Error, Debug)]
pub enum SuiteError {
    /// Configuration error
    #[error("config error: {0}")]
    ConfigError(String),

    /// Unknown deployment mode string
    #[error("unknown deployment mode: {0}")]
    UnknownDeploymentMode(String),
}

/// Result type for OpenSuite
pub type SuiteResult<T> = Result<T, SuiteError>;
