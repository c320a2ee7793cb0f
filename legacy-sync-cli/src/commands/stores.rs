//! Store write commands
//!
//! Writes go through the synchronized write path, so each one commits a sync
//! job and makes one inline delivery attempt before the command returns.

use crate::output::{status_label, SUCCESS, WARNING};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use console::style;
use legacy_sync::config::SyncConfig;
use legacy_sync::observability;
use legacy_sync::state::SyncRuntime;
use legacy_sync::store::{NewStore, Store, StoreChanges};
use legacy_sync::sync::{JobFilter, JobStatus, SyncJobStore};

/// Store commands
#[derive(Debug, Subcommand)]
pub enum StoresCommand {
    /// Create a store
    Create {
        /// Unique store name
        name: String,

        /// Initial stock level
        #[arg(short, long, default_value = "0")]
        stock: i32,
    },

    /// Update a store
    Update {
        /// Store id
        id: i64,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New stock level
        #[arg(short, long)]
        stock: Option<i32>,
    },
}

impl StoresCommand {
    /// Execute the store command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No change was requested
    /// - Failed to connect to the database
    /// - The write was rejected (unknown store, duplicate name, concurrent update)
    pub async fn execute(&self, config: SyncConfig) -> Result<()> {
        if let Self::Update {
            name: None,
            stock: None,
            ..
        } = self
        {
            bail!("Nothing to update; pass --name and/or --stock");
        }

        observability::init(&config.logging)?;
        let runtime = SyncRuntime::connect(config)
            .await
            .context("Failed to start the sync runtime")?;
        let service = runtime.pipeline().store_service();

        let result = match self {
            Self::Create { name, stock } => service
                .create(NewStore::new(name.clone(), *stock))
                .await
                .map(|store| ("created", store)),
            Self::Update { id, name, stock } => service
                .update(
                    *id,
                    StoreChanges {
                        name: name.clone(),
                        quantity_products_in_stock: *stock,
                    },
                )
                .await
                .map(|store| ("updated", store)),
        };

        let outcome = match result {
            Ok((verb, store)) => report(runtime.jobs().as_ref(), verb, &store).await,
            Err(err) => Err(err.into()),
        };
        runtime.shutdown().await?;
        outcome
    }
}

async fn report(jobs: &impl SyncJobStore, verb: &str, store: &Store) -> Result<()> {
    println!(
        "{SUCCESS} Store {} {verb} (id {}, stock {}, version {})",
        style(&store.name).cyan(),
        store.id.unwrap_or_default(),
        store.quantity_products_in_stock,
        store.version.unwrap_or_default()
    );

    let Some(id) = store.id else {
        return Ok(());
    };
    let latest = jobs
        .list(&JobFilter::default().with_store(id).with_limit(1))
        .await?;
    if let Some(job) = latest.first() {
        println!(
            "  Legacy sync: {} after {} attempt(s)",
            status_label(job.status),
            job.attempt_count
        );
        if job.status == JobStatus::Retry {
            println!(
                "  {WARNING} Delivery failed, the scheduler will retry: {}",
                job.last_error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
