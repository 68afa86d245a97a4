//! Configuration file loading.
//!
//! This module handles loading partwise configuration from TOML files
//! at XDG-compliant locations.

use crate::config::types::PartwiseConfig;
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Default configuration file name for project-local config.
const LOCAL_CONFIG_NAME: &str = "partwise.toml";

/// Default configuration file name within XDG config directory.
const XDG_CONFIG_NAME: &str = "config.toml";

/// Application name for XDG directory lookup.
const APP_NAME: &str = "partwise";

/// Loads configuration from the default search paths.
///
/// Search order:
/// 1. `./partwise.toml` (project-local)
/// 2. `~/.config/partwise/config.toml` (XDG config)
///
/// Returns an empty configuration if no config file is found.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be parsed.
///
/// # Example
///
/// ```rust,ignore
/// use partwise::config::load;
///
/// let config = load()?;
/// if config.is_empty() {
///     println!("No configuration file found, using defaults");
/// }
/// ```
pub fn load() -> Result<PartwiseConfig, ConfigError> {
    for path in search_paths() {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading configuration");
            return from_path(&path);
        }
    }

    Ok(PartwiseConfig::default())
}

/// Loads configuration from a specific file path.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file contains invalid TOML
/// - The TOML doesn't match the expected schema
/// - A value fails validation
pub fn from_path(path: &Path) -> Result<PartwiseConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::read_failed(path.display().to_string(), e.to_string()))?;

    let config: PartwiseConfig = toml::from_str(&contents).map_err(|e| {
        ConfigError::parse_failed(Some(path.display().to_string()), e.message().to_string())
    })?;
    config.validate()?;
    Ok(config)
}

/// Parses configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid, doesn't match the schema, or
/// fails validation.
///
/// # Example
///
/// ```rust
/// use partwise::config::from_str;
///
/// let config = from_str(r#"
/// default_model = "ollama:llama3.2"
///
/// [providers.ollama]
/// base_url = "http://gpu-box:11434/v1"
/// "#).unwrap();
///
/// assert_eq!(config.default_model.as_deref(), Some("ollama:llama3.2"));
/// ```
pub fn from_str(toml_str: &str) -> Result<PartwiseConfig, ConfigError> {
    let config: PartwiseConfig = toml::from_str(toml_str)
        .map_err(|e| ConfigError::parse_failed(None, e.message().to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Returns the paths that would be searched for configuration files.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];

    if let Some(dir) = xdg_config_dir() {
        paths.push(dir.join(XDG_CONFIG_NAME));
    }

    paths
}

/// Returns the path to the XDG config directory for partwise.
///
/// This is `~/.config/partwise` on most systems.
#[must_use]
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}
