//! Application configuration.
//!
//! Values are layered: built-in defaults, then `config.json` under the user's
//! config directory, then `GAMESHELF_*` environment variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::PersistentStore;

/// Directory under `~/.config` holding the configuration file.
pub const CONFIG_DIR: &str = "gameshelf";
/// Name of the configuration file.
pub const CONFIG_FILE: &str = "config.json";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GAMESHELF";

/// Runtime configuration for the library service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Location of the persisted library state.
    pub store_path: PathBuf,
    /// Games directory used when none has been chosen yet.
    pub default_games_dir: PathBuf,
    /// Quiescence window for filesystem events, in milliseconds.
    pub debounce_ms: u64,
    /// File extensions (without the dot) that mark a launchable executable.
    pub executable_extensions: Vec<String>,
    /// Whether to watch the games directory for live updates.
    pub watch_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PersistentStore::default_path(),
            default_games_dir: default_games_dir(),
            debounce_ms: 1000,
            executable_extensions: default_executable_extensions(),
            watch_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration using `path` as the optional file layer.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("executable_extensions"),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Path of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write a default configuration file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    ensure_config_at(config_path())
}

fn ensure_config_at(path: PathBuf) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(&AppConfig::default())
        .context("failed to serialize default configuration")?;
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

fn default_games_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("My Games")
}

fn default_executable_extensions() -> Vec<String> {
    let extensions: &[&str] = if cfg!(windows) {
        &["exe"]
    } else {
        &["exe", "sh", "x86_64", "appimage"]
    };
    extensions.iter().map(|ext| ext.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(dir.path().join("config.json"))?;
        assert_eq!(config.debounce_ms, 1000);
        assert!(config.watch_enabled);
        assert!(config.executable_extensions.iter().any(|ext| ext == "exe"));
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "debounce_ms": 250, "executable_extensions": ["bat"], "watch_enabled": false }"#,
        )?;

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.debounce_window(), Duration::from_millis(250));
        assert_eq!(config.executable_extensions, vec!["bat".to_string()]);
        assert!(!config.watch_enabled);
        assert_eq!(config.store_path, AppConfig::default().store_path);
        Ok(())
    }

    #[test]
    fn default_config_is_written_once() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join(CONFIG_FILE);
        ensure_config_at(path.clone())?;
        assert!(path.exists());

        fs::write(&path, r#"{ "debounce_ms": 5 }"#)?;
        ensure_config_at(path.clone())?;
        assert_eq!(AppConfig::load_from(&path)?.debounce_ms, 5);
        Ok(())
    }
}
