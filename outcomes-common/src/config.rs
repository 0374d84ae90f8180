//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable consulted when no CLI root folder is given
pub const ROOT_FOLDER_ENV: &str = "OUTCOMES_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "outcomes.db";

/// Default HTTP port for the engine service
pub const DEFAULT_HTTP_PORT: u16 = 5790;

/// TOML configuration file contents
///
/// Every field is optional; a missing or partial file falls back to
/// compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[server]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the platform config file, falling back to defaults
    ///
    /// A missing or unreadable file is never fatal: a warning is logged
    /// and compiled defaults are returned.
    pub fn load_or_default() -> Self {
        let path = match load_config_file() {
            Ok(path) => path,
            Err(e) => {
                warn!("No config file loaded ({}), using defaults", e);
                return Self::default();
            }
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: Option<&TomlConfig>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = config.and_then(|c| c.root_folder.as_ref()) {
        return root_folder.clone();
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Path of the SQLite database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Get default configuration file path for the platform
fn load_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("outcomes").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/outcomes/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/outcomes (or /var/lib/outcomes for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("outcomes"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/outcomes"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("outcomes"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/outcomes"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("outcomes"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\outcomes"))
    } else {
        PathBuf::from("./outcomes_data")
    }
}

/// Load the HTTP port stored in the settings table
#[cfg(feature = "sqlx")]
pub async fn load_http_port(db: &sqlx::SqlitePool) -> Result<u16> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'http_port'")
            .fetch_optional(db)
            .await?
            .flatten();

    match value {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("Invalid http_port setting: {}", raw))),
        None => Ok(DEFAULT_HTTP_PORT),
    }
}
