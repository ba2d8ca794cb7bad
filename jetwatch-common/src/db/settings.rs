//! Settings database operations
//!
//! Get/set accessors over the key-value settings table, plus typed
//! wrappers for the runtime tunables. Defaults here mirror the values
//! seeded by database initialization so callers behave sanely even when
//! a key was deleted out from under them.

use crate::error::{Error, Result};
use sqlx::SqlitePool;

/// Number of concurrent processing workers
pub async fn get_worker_count(db: &SqlitePool) -> Result<usize> {
    get_setting(db, "worker_count").await.map(|opt| opt.unwrap_or(4))
}

/// Idle worker sleep between claim polls, in milliseconds
pub async fn get_worker_poll_interval_ms(db: &SqlitePool) -> Result<u64> {
    get_setting(db, "worker_poll_interval_ms")
        .await
        .map(|opt| opt.unwrap_or(1000))
}

/// Job execution lease in seconds; a worker past its lease is presumed dead
pub async fn get_job_lease_seconds(db: &SqlitePool) -> Result<u64> {
    get_setting(db, "job_lease_seconds")
        .await
        .map(|opt| opt.unwrap_or(600))
}

/// Delivery budget per job (2 = one redelivery after the first attempt)
pub async fn get_job_max_attempts(db: &SqlitePool) -> Result<u32> {
    get_setting(db, "job_max_attempts")
        .await
        .map(|opt| opt.unwrap_or(2))
}

/// Ceiling for the listener's exponential reconnect backoff, in seconds
pub async fn get_listener_backoff_max_seconds(db: &SqlitePool) -> Result<u64> {
    get_setting(db, "listener_backoff_max_seconds")
        .await
        .map(|opt| opt.unwrap_or(60))
}

/// Default number of recent announcements fetched by a backfill run
pub async fn get_backfill_limit(db: &SqlitePool) -> Result<u32> {
    get_setting(db, "backfill_limit")
        .await
        .map(|opt| opt.unwrap_or(200))
}

/// Get feed bearer token from database
///
/// Returns Some(token) if set, None otherwise. Token resolution across
/// database/environment/TOML lives in the service config module.
pub async fn get_feed_token(db: &SqlitePool) -> Result<Option<String>> {
    get_setting::<String>(db, "feed_token").await
}

/// Set feed bearer token in database
pub async fn set_feed_token(db: &SqlitePool, token: String) -> Result<()> {
    set_setting(db, "feed_token", token).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
