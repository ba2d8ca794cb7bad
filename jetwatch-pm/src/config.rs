//! Configuration resolution for jetwatch-pm
//!
//! Provides multi-tier feed token resolution with Database → ENV → TOML
//! priority. The database is authoritative so an operator can rotate the
//! token at runtime without touching files or the environment.

use jetwatch_common::config::TomlConfig;
use jetwatch_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable consulted for the feed bearer token
pub const FEED_TOKEN_ENV: &str = "JETWATCH_FEED_TOKEN";

/// Resolve the feed bearer token from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_feed_token(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<String> {
    let mut sources = Vec::new();

    // Tier 1: Database (authoritative)
    let db_token = jetwatch_common::db::settings::get_feed_token(db).await?;
    if let Some(token) = &db_token {
        if is_valid_token(token) {
            sources.push("database");
        }
    }

    // Tier 2: Environment variable
    let env_token = std::env::var(FEED_TOKEN_ENV).ok();
    if let Some(token) = &env_token {
        if is_valid_token(token) {
            sources.push("environment");
        }
    }

    // Tier 3: TOML config
    let toml_token = toml_config.feed_token.as_ref();
    if let Some(token) = toml_token {
        if is_valid_token(token) {
            sources.push("TOML");
        }
    }

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Feed token found in multiple sources: {}. Using database (highest priority).",
            sources.join(", ")
        );
    }

    // Resolution priority
    if let Some(token) = db_token {
        if is_valid_token(&token) {
            info!("Feed token loaded from database");
            return Ok(token);
        }
    }

    if let Some(token) = env_token {
        if is_valid_token(&token) {
            info!("Feed token loaded from environment variable");
            return Ok(token);
        }
    }

    if let Some(token) = toml_token {
        if is_valid_token(token) {
            info!("Feed token loaded from TOML config");
            return Ok(token.clone());
        }
    }

    // No valid token found
    Err(Error::Config(
        "Feed token not configured. Please configure using one of:\n\
         1. Database: INSERT INTO settings (key, value) VALUES ('feed_token', 'your-token')\n\
         2. Environment: JETWATCH_FEED_TOKEN=your-token\n\
         3. TOML config: ~/.config/jetwatch/config.toml (feed_token = \"your-token\")\n\
         \n\
         Tokens are issued by the announcement relay operator."
            .to_string(),
    ))
}

/// Validate a token (non-empty, non-whitespace)
pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetwatch_common::db::init::init_memory_database;
    use jetwatch_common::db::settings::set_feed_token;
    use serial_test::serial;

    #[test]
    fn token_validation() {
        assert!(is_valid_token("abc123"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("   "));
    }

    #[tokio::test]
    #[serial]
    async fn database_token_wins() {
        std::env::set_var(FEED_TOKEN_ENV, "env-token");
        let pool = init_memory_database().await.unwrap();
        set_feed_token(&pool, "db-token".to_string()).await.unwrap();

        let toml_config = TomlConfig {
            feed_token: Some("toml-token".to_string()),
            ..Default::default()
        };

        let token = resolve_feed_token(&pool, &toml_config).await.unwrap();
        assert_eq!(token, "db-token");

        std::env::remove_var(FEED_TOKEN_ENV);
    }

    #[tokio::test]
    #[serial]
    async fn env_token_beats_toml() {
        std::env::set_var(FEED_TOKEN_ENV, "env-token");
        let pool = init_memory_database().await.unwrap();

        let toml_config = TomlConfig {
            feed_token: Some("toml-token".to_string()),
            ..Default::default()
        };

        let token = resolve_feed_token(&pool, &toml_config).await.unwrap();
        assert_eq!(token, "env-token");

        std::env::remove_var(FEED_TOKEN_ENV);
    }

    #[tokio::test]
    #[serial]
    async fn toml_token_is_last_resort() {
        std::env::remove_var(FEED_TOKEN_ENV);
        let pool = init_memory_database().await.unwrap();

        let toml_config = TomlConfig {
            feed_token: Some("toml-token".to_string()),
            ..Default::default()
        };

        let token = resolve_feed_token(&pool, &toml_config).await.unwrap();
        assert_eq!(token, "toml-token");
    }

    #[tokio::test]
    #[serial]
    async fn missing_token_is_config_error() {
        std::env::remove_var(FEED_TOKEN_ENV);
        let pool = init_memory_database().await.unwrap();
        let toml_config = TomlConfig::default();

        let result = resolve_feed_token(&pool, &toml_config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    #[serial]
    async fn whitespace_token_treated_as_missing() {
        std::env::set_var(FEED_TOKEN_ENV, "   ");
        let pool = init_memory_database().await.unwrap();
        let toml_config = TomlConfig::default();

        let result = resolve_feed_token(&pool, &toml_config).await;
        assert!(matches!(result, Err(Error::Config(_))));

        std::env::remove_var(FEED_TOKEN_ENV);
    }
}
