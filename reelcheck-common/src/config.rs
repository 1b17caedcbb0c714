//! Configuration file resolution and loading
//!
//! Config file priority order:
//! 1. Explicit path (caller supplied, e.g. from a command-line flag)
//! 2. Environment variable (`REELCHECK_CONFIG` unless overridden)
//! 3. Platform config directory (`<config_dir>/reelcheck/reelcheck.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing file is not an error: callers log a warning and fall back to defaults.
//! A file that exists but does not parse is always an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "REELCHECK_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "reelcheck.toml";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a configuration file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit,
    Environment,
    PlatformDefault,
}

/// Resolves which config file (if any) to load
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    env_var: String,
    app_dir: String,
}

impl ConfigFileResolver {
    /// Resolver using the standard environment variable and directory name
    pub fn new() -> Self {
        Self::with_names(CONFIG_ENV_VAR, "reelcheck")
    }

    /// Resolver with a custom environment variable and config sub-directory
    pub fn with_names(env_var: impl Into<String>, app_dir: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
            app_dir: app_dir.into(),
        }
    }

    /// Resolve the config file path following the priority order
    ///
    /// Returns `None` when no file is configured or found (use compiled defaults).
    pub fn resolve(&self, explicit: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        // Priority 1: explicit path
        if let Some(path) = explicit {
            return Some((path.to_path_buf(), ConfigSource::Explicit));
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        // Priority 3: platform config directory
        let platform = dirs::config_dir().map(|d| d.join(&self.app_dir).join(CONFIG_FILE_NAME));
        match platform {
            Some(path) if path.exists() => Some((path, ConfigSource::PlatformDefault)),
            _ => None,
        }
    }
}

impl Default for ConfigFileResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a TOML document into a configuration type
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load a configuration type from a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_toml(&content)
}

/// Resolve and load a configuration, falling back to `T::default()`
///
/// An explicitly named file that does not exist is reported as an error; a file found
/// through the environment or platform directory that has vanished degrades to defaults.
/// An empty explicit path is rejected as invalid input.
pub fn load_or_default<T>(resolver: &ConfigFileResolver, explicit: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if explicit.map_or(false, |path| path.as_os_str().is_empty()) {
        return Err(Error::InvalidInput("explicit config path is empty".to_string()));
    }
    match resolver.resolve(explicit) {
        Some((path, source)) => {
            if !path.exists() {
                if source == ConfigSource::Explicit {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                warn!(
                    path = %path.display(),
                    source = ?source,
                    "Config file not found, using compiled defaults"
                );
                return Ok(T::default());
            }
            let config = load_toml_file(&path)?;
            info!(path = %path.display(), source = ?source, "Configuration loaded");
            Ok(config)
        }
        None => {
            debug!("No config file configured, using compiled defaults");
            Ok(T::default())
        }
    }
}
