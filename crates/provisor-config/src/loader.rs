//! Configuration file loading.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::DeployConfig;

/// Configuration loading and validation errors.
///
/// All of these are fatal and raised before any plan is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("max_leverage {0} out of range, must be between 1 and 2000")]
    LeverageOutOfRange(u64),

    #[error("duplicate token symbol: {0}")]
    DuplicateSymbol(String),

    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load and validate a deployment configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<DeployConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: DeployConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
