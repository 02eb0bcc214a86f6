//! Configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration, as stored in `.zrpc/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZrpcConfig {
    /// Outbound client settings.
    pub client: ClientConfig,
    /// Logging settings.
    pub log: LogSettings,
}

/// Immutable settings for one outbound client.
///
/// Passed explicitly to the client at construction; nothing here is
/// process-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Value sent as `User-Agent` when a request does not set one.
    pub user_agent: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds. `None` leaves timing to the
    /// caller's cancellation context.
    pub request_timeout_ms: Option<u64>,
    /// Accept gzip-encoded responses.
    pub gzip: bool,
}

impl ClientConfig {
    /// The default `User-Agent` value.
    pub fn default_user_agent() -> String {
        format!("zrpc/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Builder-style override of the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Self::default_user_agent(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: None,
            gzip: true,
        }
    }
}

/// Logging settings carried in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum level: trace, debug, info, warn or error.
    pub level: String,
    /// Output format: pretty, compact or json.
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
