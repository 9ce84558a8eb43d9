//! Bootstrap configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file and cannot change while a service
//! is running. Resolution priority for both the config file and the root
//! folder is:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MEDIQ_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "MEDIQ_ROOT_FOLDER";

/// Bootstrap configuration shared by every mediq service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Path to SQLite database file, relative paths resolve against the root folder
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root folder for the database and other state (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            root_folder: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl BootstrapConfig {
    /// Absolute database path, anchored at `root` when relative
    pub fn database_path_in(&self, root: &Path) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            root.join(&self.database_path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
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

fn default_database_path() -> PathBuf {
    PathBuf::from("mediq.db")
}

fn default_port() -> u16 {
    5731
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the config file for `module_name`
///
/// Returns `None` when no file exists at any candidate location; a missing
/// config file is not an error, callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir()
        .map(|d| d.join("mediq").join(format!("{}.toml", module_name)));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/mediq").join(format!("{}.toml", module_name));
    if cfg!(target_os = "linux") && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and parse a TOML config file into `T`
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content)
        .map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Load config from `path` if given, otherwise return `T::default()`
///
/// A missing file logs a warning and yields defaults. A file that exists but
/// fails to parse is an error.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) if p.exists() => {
            info!("Loading configuration from {}", p.display());
            load_toml_config(p)
        }
        Some(p) => {
            warn!("Config file {} not found, using built-in defaults", p.display());
            Ok(T::default())
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

/// Write config to TOML atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::ConfigSerialize(e.to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Resolve the root folder
///
/// Priority: CLI argument → `MEDIQ_ROOT_FOLDER` → `root_folder` from config
/// → OS default data directory.
pub fn resolve_root_folder(cli_arg: Option<&Path>, config_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mediq"))
        .unwrap_or_else(|| PathBuf::from("./mediq_data"))
}

/// Create the root folder if missing
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    if root.exists() && !root.is_dir() {
        return Err(Error::RootFolderNotDirectory(root.to_path_buf()));
    }
    if !root.exists() {
        info!("Creating root folder: {}", root.display());
        std::fs::create_dir_all(root)?;
    }
    Ok(())
}
