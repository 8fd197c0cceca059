//! Runtime configuration and the helpers that locate and load it.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use stepstack_util::expand_tilde;
use thiserror::Error;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "STEPSTACK_CONFIG_PATH";

/// Settings shared by a [`crate::StackRuntime`] and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Label of the stack registry, used in logs.
    pub container: String,
    /// Default tracing filter. `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            container: "stack".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Returns the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepstack")
        .join("config.yaml")
}

/// Loads configuration from the default path.
pub fn load_config() -> Result<RuntimeConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads configuration from `path`. YAML and JSON are both accepted; a
/// missing file yields the defaults.
pub fn load_config_from_path(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(RuntimeConfig::default());
    }
    let config: RuntimeConfig = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.container.trim().is_empty() {
        return Err(ConfigError::Invalid("container must not be empty".into()));
    }
    Ok(())
}
