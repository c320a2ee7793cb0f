//! Long-running scheduler command

use crate::output::{INFO, SUCCESS, WARNING};
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use legacy_sync::config::SyncConfig;
use legacy_sync::observability;
use legacy_sync::state::SyncRuntime;

/// Run the scheduler until Ctrl-C
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Process the due jobs once and exit instead of polling
    #[arg(long)]
    pub once: bool,
}

impl RunCommand {
    /// Execute the run command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logging cannot be initialized
    /// - The database is unreachable or migrations fail
    /// - The scheduler task fails during shutdown
    pub async fn execute(&self, config: SyncConfig) -> Result<()> {
        observability::init(&config.logging)?;

        let mut runtime = SyncRuntime::connect(config)
            .await
            .context("Failed to start the sync runtime")?;

        if self.once {
            let attempted = runtime.pipeline().worker().process_due_jobs().await?;
            println!("{SUCCESS} Attempted {} due job(s)", style(attempted).cyan());
            runtime.shutdown().await?;
            return Ok(());
        }

        if !runtime.start_scheduler() {
            println!(
                "{WARNING} Scheduler is disabled; set {} to enable it",
                style("scheduler.enabled = true").cyan()
            );
            runtime.shutdown().await?;
            return Ok(());
        }

        println!(
            "{INFO} Legacy sync running, polling every {} ms. Press Ctrl-C to stop.",
            style(runtime.config().scheduler.poll_interval_ms).cyan()
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        println!("{INFO} Shutting down, waiting for the current run to finish...");
        runtime.shutdown().await?;
        println!("{SUCCESS} Stopped");

        Ok(())
    }
}
