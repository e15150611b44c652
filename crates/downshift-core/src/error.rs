//! Error types for downshift configuration loading.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
///
/// Any of these is fatal at startup: no partially validated
/// configuration is ever handed out.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid TOML in config file: {0}")]
    Parse(String),

    #[error("{field} out of range: {value} (expected {min} to {max})")]
    Range {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("cluster.id must not be empty")]
    EmptyClusterId,
}
