//! Configuration commands

use crate::output::{INFO, SUCCESS};
use anyhow::Result;
use clap::Subcommand;
use console::style;
use legacy_sync::config::SyncConfig;

/// Configuration commands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration and exit
    Check,
}

impl ConfigCommand {
    /// Execute the config command
    ///
    /// Loading already validated the configuration, so `check` only reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be rendered.
    pub fn execute(&self, config: &SyncConfig) -> Result<()> {
        match self {
            Self::Show => {
                println!("{INFO} {}", style("Effective configuration").bold());
                println!();
                print!("{}", config.to_toml()?);
            }
            Self::Check => {
                let policy = config.worker.retry_policy();
                println!("{SUCCESS} Configuration is valid");
                println!(
                    "  Retries:   {} attempts, backoff {:?} up to {:?}",
                    style(policy.max_attempts).cyan(),
                    policy.initial_backoff,
                    policy.max_backoff
                );
                println!(
                    "  Scheduler: {}",
                    if config.scheduler.enabled {
                        style("enabled").green()
                    } else {
                        style("disabled").yellow()
                    }
                );
            }
        }
        Ok(())
    }
}
