//! Configuration file loading and error types.

use std::{fs, path::Path};

use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid connection string '{0}'")]
    Connstring(String),
    #[error("unknown proxy protocol '{0}'")]
    UnknownScheme(String),
    #[error("invalid server string '{0}': {1}")]
    ServerSpec(String, String),
    #[error("configuration rejected:\n  {}", .0.join("\n  "))]
    Invalid(Vec<String>),
}

/// Reads and strictly decodes the JSON configuration at `path`.
///
/// Decoding success does not imply the configuration is usable; callers
/// run [`crate::validate_config`] before applying it.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let data = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&data)?)
}
