//! zrpc CLI
//!
//! Main entry point for the `zrpc` binary.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use zrpc_common_config::{ConfigLoader, Environment};

mod call;
mod cli;

use cli::{Cli, Command};

/// Application exit codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    StatusError = 3,
    NetworkError = 4,
    ValidationError = 5,
    Interrupted = 130,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create Tokio runtime: {e}");
            return Exit::GeneralError.into();
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            Exit::GeneralError.into()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Exit> {
    Environment::init().context("failed to load .env files")?;

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::new(dir),
        None => ConfigLoader::default(),
    };
    let config = match loader.load_effective() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(Exit::ConfigError);
        }
    };

    zrpc_common_log::init(cli.log_config(&config.log)).context("failed to initialize logging")?;
    tracing::debug!(config = %loader.config_path().display(), "configuration loaded");

    match cli.command {
        Command::Call(args) => call::run(args, &config.client).await,
    }
}
