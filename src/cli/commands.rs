//! CLI command definitions for forwardr.
//!
//! Every command opens the queue from the environment configuration, the
//! `--db` override and the targets file, then performs one operation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{QueueConfig, TargetsFile};
use crate::content::ContentItem;
use crate::dispatch::LocalFileReleaser;
use crate::metrics::{export_metrics, init_metrics, MetricsCollector};
use crate::queue::Queue;
use crate::scheduler::{Job, JobId, JobStatus, ProcessorError, Stagger};

/// Targets file read when `--targets-file` is not given.
const DEFAULT_TARGETS_FILE: &str = "./targets.yaml";

/// Persistent scheduled fan-out of content to publishing targets.
#[derive(Parser)]
#[command(name = "forwardr")]
#[command(about = "Fan content out to publishing targets through a persistent job queue")]
#[command(version)]
#[command(
    long_about = "forwardr schedules one job per publishing target for each content item, staggers them over time and retries failed deliveries.\n\nExample usage:\n  forwardr enqueue --content post.json --targets website,mastodon\n  forwardr run"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// SQLite database path (overrides FORWARDR_DB_PATH).
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// YAML file listing the publishing targets.
    #[arg(long, global = true)]
    pub targets_file: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the processor until Ctrl-C.
    Run,

    /// Run a single processor cycle and exit.
    ProcessOnce,

    /// Queue a content item for its targets.
    Enqueue(EnqueueArgs),

    /// Show job counts per status.
    Status(StatusArgs),

    /// List recent jobs.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one job.
    Get {
        /// Job id.
        id: JobId,
    },

    /// Cancel a pending job.
    Cancel {
        /// Job id.
        id: JobId,
    },

    /// Delete completed jobs past the retention window.
    Purge {
        /// Retention window in days (default from configuration).
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Arguments for `forwardr enqueue`.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// JSON file holding the content item.
    #[arg(short, long)]
    pub content: String,

    /// Comma-separated targets (default: targets eligible for the content).
    #[arg(short, long)]
    pub targets: Option<String>,

    /// Minutes before the first job.
    #[arg(long)]
    pub start_delay_minutes: Option<u64>,

    /// Minutes between consecutive jobs.
    #[arg(long)]
    pub interval_minutes: Option<u64>,
}

/// Arguments for `forwardr status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output JSON.
    #[arg(short = 'j', long, conflicts_with = "prometheus")]
    pub json: bool,

    /// Output Prometheus exposition text.
    #[arg(long)]
    pub prometheus: bool,
}

/// Arguments for `forwardr list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Maximum number of jobs (default from configuration).
    #[arg(short = 'n', long)]
    pub limit: Option<u32>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct EnqueueOutput {
    job_ids: Vec<JobId>,
    targets: Vec<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let queue = open_queue(cli.db.as_deref(), cli.targets_file.as_deref()).await?;

    match cli.command {
        Commands::Run => run_processor(&queue).await,
        Commands::ProcessOnce => run_process_once(&queue).await,
        Commands::Enqueue(args) => run_enqueue_command(&queue, args).await,
        Commands::Status(args) => run_status_command(&queue, args).await,
        Commands::List(args) => run_list_command(&queue, args).await,
        Commands::Get { id } => run_get_command(&queue, id).await,
        Commands::Cancel { id } => run_cancel_command(&queue, id).await,
        Commands::Purge { days } => {
            let purged = queue.purge(days).await?;
            println!("Purged {} completed job(s)", purged);
            Ok(())
        }
    }
}

/// Builds the queue from configuration, the db override and the targets file.
async fn open_queue(db: Option<&str>, targets_file: Option<&str>) -> anyhow::Result<Queue> {
    let mut config = QueueConfig::from_env()?;
    if let Some(path) = db {
        config = config.with_database_path(path);
    }
    config.validate()?;

    let targets_file = match targets_file {
        Some(path) => TargetsFile::load(path)
            .with_context(|| format!("Failed to load targets file {}", path))?,
        None if Path::new(DEFAULT_TARGETS_FILE).exists() => {
            TargetsFile::load(DEFAULT_TARGETS_FILE)?
        }
        None => {
            warn!("No targets file found, no publishing targets are registered");
            TargetsFile::default()
        }
    };

    let registry = targets_file.build_registry()?;
    let eligibility = targets_file.eligibility();

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let queue = Queue::open(
        config,
        registry,
        Arc::new(eligibility),
        Arc::new(LocalFileReleaser::new()),
    )
    .await?;

    info!(
        targets = ?queue.registry().targets(),
        database = %queue.config().database_path,
        "Queue ready"
    );
    Ok(queue)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_processor(queue: &Queue) -> anyhow::Result<()> {
    queue.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    match queue.stop().await {
        Ok(()) => Ok(()),
        Err(ProcessorError::ShutdownTimeout(timeout)) => {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                "Exiting with a dispatch still in flight"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_process_once(queue: &Queue) -> anyhow::Result<()> {
    let report = queue.process_once().await?;
    println!(
        "Dispatched {}: {} completed, {} retried, {} failed; {} asset(s) released, {} job(s) purged",
        report.dispatched,
        report.completed,
        report.retried,
        report.failed,
        report.released,
        report.purged
    );
    Ok(())
}

async fn run_enqueue_command(queue: &Queue, args: EnqueueArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.content)
        .with_context(|| format!("Failed to read content file {}", args.content))?;
    let item: ContentItem = serde_json::from_str(&text)
        .with_context(|| format!("Invalid content item in {}", args.content))?;

    let targets = args.targets.as_deref().map(parse_target_list);
    let stagger = stagger_override(
        queue.config().stagger(),
        args.start_delay_minutes,
        args.interval_minutes,
    );

    let job_ids = queue.enqueue(&item, targets, Some(stagger)).await?;

    let mut targets = Vec::with_capacity(job_ids.len());
    for id in &job_ids {
        if let Some(job) = queue.get(*id).await? {
            targets.push(job.target);
        }
    }

    let output = EnqueueOutput { job_ids, targets };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_status_command(queue: &Queue, args: StatusArgs) -> anyhow::Result<()> {
    let counts = queue.status().await?;

    if args.prometheus {
        MetricsCollector::new().set_job_counts(&counts);
        print!("{}", export_metrics());
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    for status in JobStatus::ALL {
        println!("{:<10} {}", status.as_str(), counts.get(status));
    }
    println!("{:<10} {}", "total", counts.total);
    Ok(())
}

async fn run_list_command(queue: &Queue, args: ListArgs) -> anyhow::Result<()> {
    let jobs = queue.list(args.limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }

    for job in &jobs {
        println!("{}", format_job_line(job));
    }
    Ok(())
}

async fn run_get_command(queue: &Queue, id: JobId) -> anyhow::Result<()> {
    let job = queue
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job {} not found", id))?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn run_cancel_command(queue: &Queue, id: JobId) -> anyhow::Result<()> {
    if !queue.cancel(id).await? {
        anyhow::bail!("Job {} is not pending or does not exist", id);
    }
    println!("Cancelled job {}", id);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits a comma-separated target list, dropping blanks.
fn parse_target_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Applies the minute overrides from the command line to a stagger.
fn stagger_override(
    base: Stagger,
    start_delay_minutes: Option<u64>,
    interval_minutes: Option<u64>,
) -> Stagger {
    let minutes = |m: u64| Duration::from_secs(m.saturating_mul(60));
    Stagger::new(
        start_delay_minutes.map(minutes).unwrap_or(base.start_delay),
        interval_minutes.map(minutes).unwrap_or(base.interval),
    )
}

/// One-line summary of a job for `list`.
fn format_job_line(job: &Job) -> String {
    format!(
        "{:>6}  {:<12} {:<10} attempts={}  scheduled={}",
        job.id,
        job.target,
        job.status.as_str(),
        job.attempts,
        job.scheduled_time.format("%Y-%m-%d %H:%M:%S")
    )
}
