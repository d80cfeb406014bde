//! Durable library state: the configured games directory and the per-game cache.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::models::GameCache;

/// File name used for the store under the application config directory.
pub const DEFAULT_STORE_FILE: &str = "gameshelf/library.json";

/// Everything the library persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// Directory whose immediate subdirectories are scanned as games.
    #[serde(default)]
    pub root_directory: Option<PathBuf>,
    /// Cached metadata keyed by executable path.
    #[serde(default)]
    pub game_cache: GameCache,
}

/// JSON-file backed store for [`StoreState`].
#[derive(Debug, Clone)]
pub struct PersistentStore {
    path: PathBuf,
}

impl PersistentStore {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user's config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORE_FILE)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state, returning an empty state if the file does not exist yet.
    pub fn load(&self) -> Result<StoreState> {
        if !self.path.exists() {
            return Ok(StoreState::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let state = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(state)
    }

    /// Persist state, replacing the backing file atomically.
    pub fn persist(&self, state: &StoreState) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let serialised =
            serde_json::to_vec_pretty(state).context("failed to serialize library state")?;
        let mut temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        temp.write_all(&serialised)
            .context("failed to write library state")?;
        temp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            games = state.game_cache.len(),
            "Library state persisted"
        );
        Ok(())
    }
}
