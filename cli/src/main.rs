use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, warn};

mod commands;
mod config;
mod logging;

use commands::Commands;
use config::{AppConfig, DEFAULT_CONFIG_PATH};

/// Scene Scheduler operator tool. Works offline against the config and
/// schedule files; it never contacts the production tool.
#[derive(Parser, Debug, PartialEq)]
#[command(name = "scenesched", version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "SCENESCHED_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter to use instead of the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut flags = cli.command.cli_flags();
    flags.log_level = cli.log_level.clone();
    let config = match AppConfig::load_offline(&cli.config, &flags) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging.level, config.paths.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    debug!(config = %cli.config.display(), "configuration loaded");
    for warning in config.scheduler_warnings() {
        warn!("{warning}");
    }

    match cli.command.run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
