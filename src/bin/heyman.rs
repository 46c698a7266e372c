//! heyman CLI Binary
//!
//! Answers a question about a command-line tool with a single command,
//! grounded in the tool's man page.

use anyhow::Context;
use clap::Parser;
use heyman::cli::{exit_code, map_error, Cli, RunContext};
use heyman::config::ConfigLoader;
use heyman::error::ApiError;
use heyman::logging::{init_logging, LoggingConfig};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            let code = match e.downcast_ref::<ApiError>() {
                Some(api_error) => {
                    eprintln!("Error: {}", map_error(api_error));
                    exit_code(api_error)
                }
                None => {
                    eprintln!("Error: {:#}", e);
                    1
                }
            };
            process::exit(code);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let logging_config = build_logging_config(cli);
    init_logging(&logging_config).context("Failed to initialize logging")?;
    info!("heyman starting");

    let context = RunContext::new(cli.config.clone())?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let output = context.execute(cli, &cancel).await?;
    info!("Command completed successfully");
    Ok(output)
}

/// Build logging configuration from CLI args and the config file.
///
/// Diagnostics stay off unless asked for with `--verbose`, `--log-level`
/// or `HEYMAN_LOG`, so stderr only carries progress and warnings.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    if !cli.verbose && cli.log_level.is_none() {
        let mut config = LoggingConfig::default();
        config.level = "off".to_string();
        return config;
    }

    let mut config = ConfigLoader::load(cli.config.as_deref())
        .ok()
        .map(|c| c.logging)
        .unwrap_or_default();

    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    } else if matches!(config.level.as_str(), "off" | "error" | "warn") {
        config.level = "info".to_string();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config.enabled = true;
    config
}
