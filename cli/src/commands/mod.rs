use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::{AppConfig, CliFlags};

pub mod check;
pub mod validate;

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Parse the schedule file and report what it contains
    Validate {
        /// Schedule file to read instead of the configured one
        #[arg(short, long)]
        schedule: Option<PathBuf>,
    },
    /// Show what would be on air at a given instant
    Check {
        /// RFC 3339 instant to evaluate, e.g. 2026-10-16T21:30:00+02:00 (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Schedule file to read instead of the configured one
        #[arg(short, long)]
        schedule: Option<PathBuf>,
    },
}

impl Commands {
    /// Flags that override the loaded configuration.
    pub fn cli_flags(&self) -> CliFlags {
        match self {
            Commands::Validate { schedule } | Commands::Check { schedule, .. } => CliFlags {
                schedule: schedule.clone(),
                ..Default::default()
            },
        }
    }

    pub async fn run(self, config: AppConfig) -> Result<()> {
        match self {
            Commands::Validate { .. } => validate::run(&config).await,
            Commands::Check { at, .. } => check::run(&config, at.as_deref()).await,
        }
    }
}
