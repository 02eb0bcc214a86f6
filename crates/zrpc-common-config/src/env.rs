//! Environment variable handling.

use std::env;
use std::path::Path;
use thiserror::Error;

use crate::types::ClientConfig;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    pub const ZRPC_CONFIG_DIR: &str = "ZRPC_CONFIG_DIR";
    pub const ZRPC_ENV: &str = "ZRPC_ENV";

    // Client overrides
    pub const ZRPC_USER_AGENT: &str = "ZRPC_USER_AGENT";
    pub const ZRPC_CONNECT_TIMEOUT_MS: &str = "ZRPC_CONNECT_TIMEOUT_MS";
    pub const ZRPC_REQUEST_TIMEOUT_MS: &str = "ZRPC_REQUEST_TIMEOUT_MS";
    pub const ZRPC_GZIP: &str = "ZRPC_GZIP";
}

/// Environment configuration.
#[derive(Debug)]
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files in the working directory.
    pub fn init() -> Result<Self, EnvError> {
        Self::init_in(Path::new("."))
    }

    /// Initialize environment from `.env`, `.env.local` and `.env.$ZRPC_ENV`
    /// in `dir`. Missing files are skipped; unreadable or malformed ones fail.
    pub fn init_in(dir: &Path) -> Result<Self, EnvError> {
        // Variables already set, by the process or an earlier file, win.
        load_optional(&dir.join(".env"))?;
        load_optional(&dir.join(".env.local"))?;

        if let Ok(env) = env::var(vars::ZRPC_ENV) {
            load_optional(&dir.join(format!(".env.{}", env)))?;
        }

        Ok(Self { _guard: () })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var).ok().map(|v| {
            matches!(v.to_lowercase().as_str(), "true" | "1" | "yes")
        })
    }

    /// Get an integer variable.
    pub fn get_int<T: std::str::FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: format!("expected integer, got {v:?}"),
            }),
            Err(_) => Ok(None),
        }
    }
}

fn load_optional(path: &Path) -> Result<(), EnvError> {
    match dotenvy::from_filename(path) {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl ClientConfig {
    /// Apply `ZRPC_*` overrides from the environment.
    pub fn apply_env(&mut self) -> Result<(), EnvError> {
        if let Some(user_agent) = Environment::get(vars::ZRPC_USER_AGENT) {
            self.user_agent = user_agent;
        }
        if let Some(ms) = Environment::get_int(vars::ZRPC_CONNECT_TIMEOUT_MS)? {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = Environment::get_int(vars::ZRPC_REQUEST_TIMEOUT_MS)? {
            self.request_timeout_ms = Some(ms);
        }
        if let Some(gzip) = Environment::get_bool(vars::ZRPC_GZIP) {
            self.gzip = gzip;
        }
        Ok(())
    }
}
