//! Database management commands

use crate::output::{rule, INFO, SUCCESS};
use anyhow::{Context, Result};
use clap::Subcommand;
use console::style;
use legacy_sync::config::SyncConfig;
use legacy_sync::postgres::{self, MIGRATOR};

/// Database commands
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Run pending migrations
    Migrate,
    /// List the embedded migrations
    Migrations,
}

impl DbCommand {
    /// Execute the database command
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn execute(&self, config: SyncConfig) -> Result<()> {
        match self {
            Self::Migrate => migrate(&config).await,
            Self::Migrations => {
                list_migrations();
                Ok(())
            }
        }
    }
}

async fn migrate(config: &SyncConfig) -> Result<()> {
    println!("{INFO} Running migrations...");
    let pool = postgres::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    postgres::migrate(&pool).await?;
    pool.close().await;
    println!("{SUCCESS} Migrations applied");
    Ok(())
}

fn list_migrations() {
    println!("\n{INFO} Embedded migrations");
    println!("{}", rule());
    for migration in MIGRATOR.iter() {
        println!(
            "  {:<16} {}",
            style(migration.version).cyan(),
            migration.description
        );
    }
    println!();
}
