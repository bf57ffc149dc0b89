//! Bootstrap configuration loading and data folder resolution
//!
//! Services read a small TOML bootstrap file at startup. Its location is
//! resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `IDEAHUB_<MODULE>_CONFIG`
//! 3. `ideahub-<module>.toml` in the working directory
//! 4. `ideahub-<module>.toml` in the platform config directory
//!
//! A missing file is never fatal: the service logs a warning and starts
//! with built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration shared by all services
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locates a service's bootstrap TOML file
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    module_name: String,
}

impl ConfigFileResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Environment variable consulted for an explicit config path
    pub fn env_var_name(&self) -> String {
        format!(
            "IDEAHUB_{}_CONFIG",
            self.module_name.to_uppercase().replace('-', "_")
        )
    }

    /// File name looked up in the working and platform config directories
    pub fn file_name(&self) -> String {
        format!("ideahub-{}.toml", self.module_name)
    }

    /// Resolve the config file path, or `None` when no file is configured
    /// or present.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(self.env_var_name()) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let local = PathBuf::from(self.file_name());
        if local.exists() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|d| d.join("ideahub").join(self.file_name()))
            .filter(|p| p.exists())
    }
}

/// Load a TOML bootstrap file into `T`
///
/// `None` or a path that does not exist yields `T::default()`. A file that
/// exists but cannot be read or parsed is a configuration error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Data folder resolution: `IDEAHUB_DATA_DIR` → platform data dir → `./ideahub_data`
pub fn resolve_data_folder() -> PathBuf {
    if let Ok(path) = std::env::var("IDEAHUB_DATA_DIR") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::data_local_dir()
        .map(|d| d.join("ideahub"))
        .unwrap_or_else(|| PathBuf::from("./ideahub_data"))
}

/// Creates the data folder and derives file locations inside it
#[derive(Debug, Clone)]
pub struct DataFolder {
    root: PathBuf,
}

impl DataFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created data folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("ideahub.db")
    }
}
