//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Parsed TOML configuration file
///
/// All fields are optional; missing sections fall back to defaults so a
/// bare config file (or none at all) still yields a working setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root data folder (database and scratch space live beneath it)
    pub root_folder: Option<String>,

    /// Feed bearer token (lowest-priority source for token resolution)
    pub feed_token: Option<String>,

    #[serde(default)]
    pub feed: FeedSettings,

    #[serde(default)]
    pub content: ContentSettings,

    #[serde(default)]
    pub authors: AuthorsSettings,

    #[serde(default)]
    pub detector: DetectorSettings,
}

/// Announcement feed endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    /// Base URL of the announcement feed relay
    #[serde(default = "FeedSettings::default_base_url")]
    pub base_url: String,
    /// Account whose announcements are monitored
    #[serde(default = "FeedSettings::default_account")]
    pub account: String,
}

impl FeedSettings {
    fn default_base_url() -> String {
        "http://127.0.0.1:8600".to_string()
    }

    fn default_account() -> String {
        "biorxivpreprint".to_string()
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            account: Self::default_account(),
        }
    }
}

/// Paper content download settings
#[derive(Debug, Clone, Deserialize)]
pub struct ContentSettings {
    /// Base URL papers are downloaded from, joined with `<id>.full.pdf`
    #[serde(default = "ContentSettings::default_base_url")]
    pub base_url: String,
}

impl ContentSettings {
    fn default_base_url() -> String {
        "https://www.biorxiv.org/content".to_string()
    }
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
        }
    }
}

/// Author directory service settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorsSettings {
    /// Base URL of the author directory service
    #[serde(default = "AuthorsSettings::default_base_url")]
    pub base_url: String,
}

impl AuthorsSettings {
    fn default_base_url() -> String {
        "http://127.0.0.1:8601".to_string()
    }
}

impl Default for AuthorsSettings {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
        }
    }
}

/// External colormap classifier settings
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSettings {
    /// Classifier executable invoked per downloaded paper
    #[serde(default = "DetectorSettings::default_command")]
    pub command: String,
}

impl DetectorSettings {
    fn default_command() -> String {
        "jetscan".to_string()
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            command: Self::default_command(),
        }
    }
}

impl TomlConfig {
    /// Load the platform config file, if one exists
    pub fn load() -> Result<TomlConfig> {
        let path = config_file_path()?;
        Self::load_from(&path)
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config: Option<&TomlConfig>,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = config.and_then(|c| c.root_folder.as_deref()) {
        return Ok(PathBuf::from(root_folder));
    }

    // Priority 4: OS-dependent compiled default
    Ok(get_default_root_folder())
}

/// Database file path beneath the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("jetwatch.db")
}

/// Get default configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/jetwatch/config.toml first, then /etc/jetwatch/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("jetwatch").join("config.toml"));
        let system_config = PathBuf::from("/etc/jetwatch/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let path = dirs::config_dir()
        .map(|d| d.join("jetwatch").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("jetwatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/jetwatch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("jetwatch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/jetwatch"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("jetwatch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\jetwatch"))
    } else {
        PathBuf::from("./jetwatch_data")
    }
}
