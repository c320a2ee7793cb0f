//! legacy-sync CLI library

#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::cargo)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::multiple_crate_versions)]

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{ConfigCommand, DbCommand, JobsCommand, RunCommand, StoresCommand};
use legacy_sync::config::SyncConfig;
use std::path::{Path, PathBuf};

/// Command line interface
#[derive(Debug, Parser)]
#[command(name = "legacy-sync")]
#[command(version)]
#[command(about = "Synchronize store changes to the legacy system", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./legacy-sync.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the background scheduler until interrupted
    Run(RunCommand),
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Inspect sync jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommand,
    },
    /// Create or update stores through the synchronized write path
    Stores {
        #[command(subcommand)]
        command: StoresCommand,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

impl Cli {
    /// Execute the parsed command
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the command fails.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        match self.command {
            Commands::Run(command) => command.execute(config).await,
            Commands::Db { command } => command.execute(config).await,
            Commands::Jobs { command } => command.execute(config).await,
            Commands::Stores { command } => command.execute(config).await,
            Commands::Config { command } => command.execute(&config),
        }
    }
}

/// Load configuration from `path`, or from the default file when `None`
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or holds invalid values.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => SyncConfig::load().context("Failed to load configuration"),
    }
}
