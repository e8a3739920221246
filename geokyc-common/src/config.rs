//! Configuration file resolution, TOML loading and logging bootstrap
//!
//! Config path resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/geokyc/<file_name>`)
//!
//! Unlike most settings in a service, decision parameters (weights,
//! thresholds) never fall back to compiled defaults. A missing file is an
//! error, not a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (e.g. "info", "geokyc_risk=debug,tower_http=info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include span/target information in log lines
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_with_target(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

/// Resolve the configuration file path
///
/// Returns an error when no candidate exists; callers treat that as fatal.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        debug!(path = %path.display(), "Config path from command line");
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!(path = %path, env_var = env_var_name, "Config path from environment");
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    let candidate = default_config_dir().join(file_name);
    if candidate.exists() {
        debug!(path = %candidate.display(), "Config path from platform config directory");
        return Ok(candidate);
    }

    Err(Error::Config(format!(
        "No configuration file found. Provide one of:\n\
         1. --config <path>\n\
         2. Environment: {}=<path>\n\
         3. {}",
        env_var_name,
        candidate.display()
    )))
}

/// Platform config directory for GeoKYC (`~/.config/geokyc` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("geokyc"))
        .unwrap_or_else(|| PathBuf::from("./geokyc"))
}

/// Read and deserialize a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_toml(&content)
}

/// Deserialize a TOML document
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| {
            Error::Config(format!("Invalid log level '{}': {}", logging.level, e))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.with_target)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
