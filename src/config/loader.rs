//! Configuration loading and discovery for `assetpipe.toml`
//!
//! Provides functions to find the local override file, load it, and merge
//! it over the built-in defaults.

use super::schema::{Settings, SettingsOverride};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the local override file
pub const CONFIG_FILE_NAME: &str = "assetpipe.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error (including values of the wrong type)
    #[error("Failed to parse assetpipe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override dev server port
    pub port: Option<u16>,
}

/// Settings resolved for one invocation, with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    /// The effective settings
    pub settings: Settings,
    /// Directory relative paths are resolved against
    pub project_root: PathBuf,
    /// Override file that was applied, if any
    pub source: Option<PathBuf>,
    /// Keys in the override file that are not part of the schema
    pub unknown_keys: Vec<String>,
}

/// Find `assetpipe.toml` by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find `assetpipe.toml` by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Parse an override file without merging it.
pub fn load_overrides(path: &Path) -> Result<SettingsOverride, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let overrides: SettingsOverride = toml::from_str(&contents)?;
    Ok(overrides)
}

/// Resolve the effective settings.
///
/// If a path is provided it must point to a readable override file.
/// Otherwise the file is discovered with [`find_config`]; when none exists
/// the defaults are returned and the working directory is the project root.
pub fn load_settings(path: Option<&Path>) -> Result<LoadedSettings, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    let cwd = env::current_dir()?;
    match config_path {
        Some(p) => {
            let root = p
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.clone());
            load_settings_file(&p, root)
        }
        None => Ok(LoadedSettings {
            settings: Settings::default(),
            project_root: cwd,
            source: None,
            unknown_keys: vec![],
        }),
    }
}

/// Load and merge a specific override file.
pub fn load_settings_file(path: &Path, project_root: PathBuf) -> Result<LoadedSettings, ConfigError> {
    let overrides = load_overrides(path)?;
    let unknown_keys = overrides.unknown_keys();
    let settings = Settings::default().merge(overrides);

    let errors = settings.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(LoadedSettings { settings, project_root, source: Some(path.to_path_buf()), unknown_keys })
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(settings: &mut Settings, overrides: &CliOverrides) {
    if let Some(port) = overrides.port {
        settings.port = port;
    }
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path.strip_prefix("./").unwrap_or(path))
    }
}
