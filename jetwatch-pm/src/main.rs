//! jetwatch-pm - Paper Monitor service
//!
//! Watches the preprint announcement feed for new papers, downloads each
//! one, classifies its figures for rainbow colormaps, and records flagged
//! papers together with author contact emails for follow-up.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jetwatch_common::config::{self, TomlConfig};
use jetwatch_common::db::{self, settings};
use jetwatch_common::events::EventBus;
use jetwatch_common::models::JobState;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jetwatch_pm::config::resolve_feed_token;
use jetwatch_pm::ingest::{BackfillPoller, EventListener, IntakeHandler};
use jetwatch_pm::services::{AuthorsClient, ContentClient, DetectorClient, FeedClient};
use jetwatch_pm::worker::{ProcessPipeline, QueuedDispatch, WorkerPool};

/// Command-line arguments for jetwatch-pm
#[derive(Parser, Debug)]
#[command(name = "jetwatch-pm")]
#[command(about = "Paper Monitor: flags rainbow colormaps in newly announced preprints")]
#[command(version)]
struct Args {
    /// Root folder for the database and working files
    #[arg(short, long, env = "JETWATCH_ROOT_FOLDER")]
    root_folder: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live monitor: stream listener plus processing worker pool
    Monitor,
    /// Ingest the most recent timeline announcements, then exit
    Backfill {
        /// Announcements to fetch (default: the stored backfill_limit setting)
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Print record counts, recent papers, and queue state
    Status {
        /// How many recent papers to list
        #[arg(short = 'n', long, default_value_t = 10)]
        recent: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jetwatch_pm=debug,jetwatch_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting jetwatch-pm (Paper Monitor)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let toml_config = TomlConfig::load().ok();
    let root_folder = config::resolve_root_folder(
        args.root_folder.as_deref(),
        "JETWATCH_ROOT_FOLDER",
        toml_config.as_ref(),
    )?;
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let db_path = config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = db::init_database(&db_path).await?;

    let toml_config = toml_config.unwrap_or_default();

    match args.command {
        Command::Monitor => run_monitor(pool, toml_config).await,
        Command::Backfill { limit } => run_backfill(pool, toml_config, limit).await,
        Command::Status { recent } => run_status(pool, recent).await,
    }
}

/// Run the live monitor until ctrl-c / SIGTERM
async fn run_monitor(pool: SqlitePool, toml_config: TomlConfig) -> Result<()> {
    let events = EventBus::new(256);

    let feed_token = resolve_feed_token(&pool, &toml_config).await?;
    let source = Arc::new(FeedClient::new(
        toml_config.feed.base_url.clone(),
        toml_config.feed.account.clone(),
        Some(feed_token),
    )?);
    let fetcher = Arc::new(ContentClient::new(toml_config.content.base_url.clone())?);
    let detector = Arc::new(DetectorClient::new(toml_config.detector.command.clone())?);
    let authors = Arc::new(AuthorsClient::new(toml_config.authors.base_url.clone())?);

    let pipeline = Arc::new(ProcessPipeline::new(
        pool.clone(),
        fetcher,
        detector,
        authors,
        events.clone(),
    ));
    let workers = WorkerPool::from_settings(pool.clone(), pipeline, events.clone()).await?;

    let max_attempts = settings::get_job_max_attempts(&pool).await?;
    let dispatch = Arc::new(QueuedDispatch::new(pool.clone(), max_attempts, events.clone()));
    let intake = IntakeHandler::new(pool.clone(), dispatch, events.clone());

    let backoff_max =
        Duration::from_secs(settings::get_listener_backoff_max_seconds(&pool).await?);
    let listener = EventListener::new(source, intake, events.clone(), backoff_max);

    let cancel = CancellationToken::new();
    let listener_cancel = cancel.clone();
    let worker_cancel = cancel.clone();

    let listener_task = tokio::spawn(async move { listener.run(listener_cancel).await });
    let worker_task = tokio::spawn(async move { workers.run(worker_cancel).await });

    info!("Monitor running; press Ctrl+C to stop");
    shutdown_signal().await;
    cancel.cancel();

    let _ = listener_task.await;
    let _ = worker_task.await;

    info!("Monitor shutdown complete");
    Ok(())
}

/// Catch up from the timeline, processing through the durable queue
async fn run_backfill(
    pool: SqlitePool,
    toml_config: TomlConfig,
    limit: Option<u32>,
) -> Result<()> {
    let events = EventBus::new(256);

    let feed_token = resolve_feed_token(&pool, &toml_config).await?;
    let source = Arc::new(FeedClient::new(
        toml_config.feed.base_url.clone(),
        toml_config.feed.account.clone(),
        Some(feed_token),
    )?);

    let max_attempts = settings::get_job_max_attempts(&pool).await?;
    let dispatch = Arc::new(QueuedDispatch::new(pool.clone(), max_attempts, events.clone()));
    let intake = IntakeHandler::new(pool.clone(), dispatch, events);

    let limit = match limit {
        Some(n) => n,
        None => settings::get_backfill_limit(&pool).await?,
    };

    let poller = BackfillPoller::new(source, intake);
    let summary = poller.run(limit).await?;

    println!(
        "Backfill: {} fetched, {} ingested ({} deduplicated), {} discarded",
        summary.fetched, summary.ingested, summary.deduplicated, summary.discarded
    );
    println!("Queued jobs are processed by a running `jetwatch-pm monitor`.");
    Ok(())
}

/// Print the paper and queue state
async fn run_status(pool: SqlitePool, recent: i64) -> Result<()> {
    let counts = db::papers::count_papers_by_status(&pool).await?;
    println!("Papers: {} total", counts.total());
    println!("  unprocessed: {}", counts.unprocessed);
    println!("  clean:       {}", counts.clean);
    println!("  flagged:     {}", counts.flagged);

    let depth = db::queue::queue_depth(&pool).await?;
    println!(
        "\nQueue: {} queued, {} running, {} done, {} failed",
        depth.queued, depth.running, depth.done, depth.failed
    );

    let failed = db::queue::list_jobs(&pool, Some(JobState::Failed), 20).await?;
    if !failed.is_empty() {
        println!("\nFailed jobs (manual triage):");
        for job in failed {
            println!(
                "  {} paper={} attempts={}/{} error={}",
                job.job_id,
                job.paper_id,
                job.attempts,
                job.max_attempts,
                job.last_error.as_deref().unwrap_or("-")
            );
        }
    }

    let papers = db::papers::list_papers(&pool, recent).await?;
    if !papers.is_empty() {
        println!("\nRecent papers:");
        for paper in papers {
            let contact = match &paper.author_contact {
                Some(c) => format!(" corresponding={}", c.corresponding.join(",")),
                None => String::new(),
            };
            println!(
                "  {} [{}] {}{}",
                paper.id,
                paper.parse_status.as_str(),
                paper.title,
                contact
            );
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
