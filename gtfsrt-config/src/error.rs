//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading the catalog file
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// YAML parsing error
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Validation error with the offending catalog path
    #[error("invalid configuration at {path}: {message}")]
    Validation { path: String, message: String },

    /// Environment variable error
    #[error("environment variable error: {0}")]
    Env(String),
}

impl ConfigError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}
