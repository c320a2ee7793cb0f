//! Job inspection CLI commands

use crate::output::{format_timestamp, job_header, job_row, rule, status_label, INFO};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use console::style;
use legacy_sync::config::SyncConfig;
use legacy_sync::postgres::{self, PgSyncJobStore};
use legacy_sync::sync::{JobFilter, JobStats, JobStatus, SyncJob, SyncJobId, SyncJobStore};

/// Job inspection commands
///
/// Jobs are read-only here; finished jobs are never resurrected.
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List jobs, newest first
    List {
        /// Filter by status (pending, retry, succeeded, failed)
        #[arg(short, long)]
        status: Option<JobStatus>,

        /// Filter by store id
        #[arg(long)]
        store: Option<i64>,

        /// Limit number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one job in detail
    Show {
        /// Job ID
        job_id: SyncJobId,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show job counts per status
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl JobsCommand {
    /// Execute the jobs command
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Failed to connect to the database
    /// - Failed to read jobs
    /// - The requested job does not exist
    pub async fn execute(&self, config: SyncConfig) -> Result<()> {
        let pool = postgres::connect(&config.database)
            .await
            .context("Failed to connect to the database")?;
        let jobs = PgSyncJobStore::new(pool.clone());

        let result = match self {
            Self::List {
                status,
                store,
                limit,
                json,
            } => {
                let mut filter = JobFilter::default().with_limit(*limit);
                if let Some(status) = status {
                    filter = filter.with_status(*status);
                }
                if let Some(store) = store {
                    filter = filter.with_store(*store);
                }
                list(&jobs, &filter, *json).await
            }
            Self::Show { job_id, json } => show(&jobs, *job_id, *json).await,
            Self::Stats { json } => stats(&jobs, *json).await,
        };

        pool.close().await;
        result
    }
}

async fn list(jobs: &impl SyncJobStore, filter: &JobFilter, json: bool) -> Result<()> {
    let found = jobs.list(filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    println!("\n{INFO} Legacy sync jobs");
    println!();

    let header = match filter.status {
        Some(status) => format!(
            "Showing up to {} jobs with status: {}",
            filter.limit,
            style(status).cyan()
        ),
        None => format!("Showing last {} jobs", filter.limit),
    };
    println!("{}", style(header).bold());
    println!("{}", rule());
    println!("{}", job_header());
    println!("{}", rule());

    if found.is_empty() {
        println!("  {}", style("(No jobs to display)").dim());
    }
    for job in &found {
        println!("{}", job_row(job));
    }
    println!();

    Ok(())
}

async fn show(jobs: &impl SyncJobStore, id: SyncJobId, json: bool) -> Result<()> {
    let Some(job) = jobs.find(id).await? else {
        bail!("Job {id} not found");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_job(&job);
    }
    Ok(())
}

fn print_job(job: &SyncJob) {
    println!("\n{INFO} Job {}", style(job.id).cyan());
    println!();
    println!("  Status:           {}", status_label(job.status));
    println!("  Store:            {}", job.store_id);
    println!("  Change:           {}", job.change_type);
    println!(
        "  Expected version: {}",
        job.expected_version
            .map_or_else(|| "-".to_string(), |version| version.to_string())
    );
    println!("  Correlation:      {}", job.correlation_id);
    println!("  Attempts:         {}", job.attempt_count);
    println!("  Next attempt:     {}", format_timestamp(job.next_attempt_at));
    println!("  Created:          {}", format_timestamp(job.created_at));
    println!("  Updated:          {}", format_timestamp(job.updated_at));
    println!("  Token:            {}", job.concurrency_token);
    if let Some(error) = &job.last_error {
        println!("  Last error:       {}", style(error).red());
    }
    println!();
}

async fn stats(jobs: &impl SyncJobStore, json: bool) -> Result<()> {
    let stats: JobStats = jobs.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("\n{INFO} Job Statistics");
    println!();
    println!("{}", style("Queue Status").bold().underlined());
    println!("  Total:      {}", style(stats.total()).cyan());
    for status in JobStatus::ALL {
        println!("  {:<11} {}", status.as_str(), stats.get(status));
    }
    println!("  Outstanding: {}", style(stats.outstanding()).yellow());
    println!();

    Ok(())
}
