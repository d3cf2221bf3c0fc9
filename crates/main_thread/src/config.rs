//! Main-thread runtime configuration.
//!
//! Defaults are the production settings; a TOML file may override them:
//!
//! ```toml
//! dev-hot-swap = true
//! list-container-full-update = true
//! trace-patches = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Apply developer-mode `AddDefinition` ops instead of ignoring them.
    pub dev_hot_swap: bool,
    /// Lists in list-container mode describe every child in `updateAction`.
    pub list_container_full_update: bool,
    /// Log every applied op at debug level.
    pub trace_patches: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dev_hot_swap: false,
            list_container_full_update: true,
            trace_patches: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "cannot read config: {err}"),
            ConfigError::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl RuntimeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(ConfigError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&input)
    }
}
