//! Database initialization
//!
//! Creates the SQLite database on first run, applies connection pragmas,
//! and bootstraps every table with `CREATE TABLE IF NOT EXISTS` so startup
//! is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    apply_pragmas(&pool).await?;

    // Idempotent bootstrap, safe to run on every startup
    create_settings_table(&pool).await?;
    create_papers_table(&pool).await?;
    create_jobs_table(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database with the full schema (tests and tooling)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    apply_pragmas(&pool).await?;
    create_settings_table(&pool).await?;
    create_papers_table(&pool).await?;
    create_jobs_table(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    // WAL allows concurrent readers while a worker commits
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Lock waits instead of immediate SQLITE_BUSY under writer contention
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the papers table
///
/// One row per announced paper. Intake owns `created` and `title`; the
/// processing pipeline owns `parse_status`, `parse_data` and
/// `author_contact`. The two groups are merged independently.
pub async fn create_papers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS papers (
            id TEXT PRIMARY KEY,
            created TIMESTAMP NOT NULL,
            title TEXT NOT NULL,
            parse_status TEXT NOT NULL DEFAULT 'unprocessed'
                CHECK (parse_status IN ('unprocessed', 'clean', 'flagged')),
            parse_data TEXT,
            author_contact TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_status ON papers(parse_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_created ON papers(created)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the jobs table (durable processing queue)
///
/// Job timestamps are always bound from Rust so the stored text format is
/// uniform and lease/order comparisons against bound parameters are exact.
pub async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            paper_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'queued'
                CHECK (state IN ('queued', 'running', 'done', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 2,
            lease_expires_at TIMESTAMP,
            last_error TEXT,
            enqueued_at TIMESTAMP NOT NULL,
            started_at TIMESTAMP,
            finished_at TIMESTAMP,
            CHECK (attempts >= 0),
            CHECK (max_attempts > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one queued/running job per paper; enqueue upserts against this
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_paper
        ON jobs(paper_id) WHERE state IN ('queued', 'running')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state, enqueued_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize or repair default settings
///
/// Ensures all required settings exist; NULL values are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Processing worker settings
    ensure_setting(pool, "worker_count", "4").await?;
    ensure_setting(pool, "worker_poll_interval_ms", "1000").await?;

    // Job queue settings
    ensure_setting(pool, "job_lease_seconds", "600").await?; // 10 minutes
    ensure_setting(pool, "job_max_attempts", "2").await?; // one redelivery

    // Listener / backfill settings
    ensure_setting(pool, "listener_backoff_max_seconds", "60").await?;
    ensure_setting(pool, "backfill_limit", "200").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!(
            "Initialized setting '{}' with default value: {}",
            key, default_value
        );
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
