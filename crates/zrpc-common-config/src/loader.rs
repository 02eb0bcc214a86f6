//! Configuration file loading and parsing.

use crate::env::EnvError;
use crate::types::ZrpcConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const CONFIG_DIR: &str = ".zrpc";
const CONFIG_FILE: &str = "config.yaml";

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

fn env_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env reference pattern is valid")
    })
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the config file this loader reads.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from `.zrpc/config.yaml`, or defaults if absent.
    pub fn load(&self) -> Result<ZrpcConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(ZrpcConfig::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let expanded = self.expand_env_vars(&contents)?;

        let config: ZrpcConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        self.validate(&config)?;
        Ok(config)
    }

    /// Load the file, then apply `ZRPC_*` environment overrides and
    /// re-validate.
    pub fn load_effective(&self) -> Result<ZrpcConfig, ConfigError> {
        let mut config = self.load()?;
        config.client.apply_env()?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in env_ref_pattern().captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match (std::env::var(var_name), default) {
                (Ok(v), _) => v,
                (Err(_), Some(d)) => d.to_string(),
                (Err(_), None) => {
                    return Err(ConfigError::EnvVarNotFound {
                        var: var_name.to_string(),
                    })
                }
            };

            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// Validate configuration values.
    fn validate(&self, config: &ZrpcConfig) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::ValidationError {
                message: message.to_string(),
            })
        };

        if config.client.user_agent.trim().is_empty() {
            return invalid("client.user_agent must not be empty");
        }
        if config.client.connect_timeout_ms == 0 {
            return invalid("client.connect_timeout_ms must be greater than 0");
        }
        if config.client.request_timeout_ms == Some(0) {
            return invalid("client.request_timeout_ms must be greater than 0 when set");
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        let dir = std::env::var(crate::env::vars::ZRPC_CONFIG_DIR)
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())
            .unwrap_or_default();
        Self::new(dir)
    }
}
