//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use zrpc_client::Method;
use zrpc_common_config::LogSettings;
use zrpc_common_log::{LogConfig, LogFormat, LogLevel};

/// zrpc - cancellable HTTP calls from the command line
#[derive(Debug, Parser)]
#[command(name = "zrpc", author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding `.zrpc/config.yaml`
    #[arg(long, global = true, env = "ZRPC_CONFIG_DIR", value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one request and print the decoded response
    Call(CallArgs),
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// HTTP method (GET, POST, ...)
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Absolute URL, or "-H <host> <url>" to override the Host header
    #[arg(allow_hyphen_values = true)]
    pub endpoint: String,

    /// Host header override, same as prefixing the endpoint with "-H <host>"
    #[arg(long)]
    pub host: Option<String>,

    /// JSON request body
    #[arg(long, conflicts_with = "form")]
    pub json: Option<String>,

    /// Form field as key=value; repeatable
    #[arg(long, value_parser = parse_field)]
    pub form: Vec<(String, String)>,

    /// Request id sent as X-Reqid
    #[arg(long)]
    pub reqid: Option<String>,

    /// User sent as X-User
    #[arg(long)]
    pub user: Option<String>,

    /// Cancel the call after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl CallArgs {
    /// The endpoint string with any `--host` folded in.
    pub fn endpoint(&self) -> String {
        match &self.host {
            Some(host) => format!("-H {host} {}", self.endpoint),
            None => self.endpoint.clone(),
        }
    }
}

impl Cli {
    /// Logging settings: file settings, then `ZRPC_LOG_*`, then `-v`.
    pub fn log_config(&self, settings: &LogSettings) -> LogConfig {
        let mut config = LogConfig::from_env();

        let level_from_env = std::env::var_os("ZRPC_LOG_LEVEL").is_some() || std::env::var_os("RUST_LOG").is_some();
        if !level_from_env {
            if let Some(level) = LogLevel::parse(&settings.level) {
                config.level = level;
            }
        }
        if std::env::var_os("ZRPC_LOG_FORMAT").is_none() {
            if let Some(format) = LogFormat::parse(&settings.format) {
                config.format = format;
            }
        }

        config.level = match self.verbose {
            0 => config.level,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
        config
    }
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_uppercase().as_bytes()).map_err(|e| e.to_string())
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}
