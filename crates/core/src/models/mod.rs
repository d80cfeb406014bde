//! Shared domain models.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned to games the user has not categorised yet.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Persisted per-game metadata keyed by executable path.
///
/// Ordered so that the serialised form is stable across passes.
pub type GameCache = BTreeMap<PathBuf, CacheEntry>;

/// A game directory as discovered on disk, before any cached metadata is merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGameEntry {
    /// Absolute path of the game's containing directory.
    pub identity: PathBuf,
    /// Base name of the game directory.
    pub display_name: String,
    /// Absolute path of the selected launch target.
    pub executable_path: PathBuf,
    /// Modification time of the game directory, when the platform reports one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Total size of regular files beneath the game directory.
    pub size_bytes: u64,
}

/// User and session metadata that survives rescans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// User-assigned category.
    #[serde(default = "default_category")]
    pub category: String,
    /// User-assigned tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Whether the game is pinned as a favorite.
    #[serde(default)]
    pub favorite: bool,
    /// Time of the most recent launch, stored as epoch milliseconds.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_played_at: Option<DateTime<Utc>>,
    /// Number of confirmed launches.
    #[serde(default)]
    pub play_count: u64,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            category: default_category(),
            tags: BTreeSet::new(),
            favorite: false,
            last_played_at: None,
            play_count: 0,
        }
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Authoritative view of one game: filesystem attributes plus cached metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Absolute path of the game's containing directory.
    pub identity: PathBuf,
    /// Base name of the game directory.
    pub display_name: String,
    /// Absolute path of the launch target.
    pub executable_path: PathBuf,
    /// Modification time of the game directory.
    pub last_modified: Option<DateTime<Utc>>,
    /// Total size of regular files beneath the game directory.
    pub size_bytes: u64,
    /// User-assigned category.
    pub category: String,
    /// User-assigned tags.
    pub tags: BTreeSet<String>,
    /// Whether the game is pinned as a favorite.
    pub favorite: bool,
    /// Time of the most recent launch.
    pub last_played_at: Option<DateTime<Utc>>,
    /// Number of confirmed launches.
    pub play_count: u64,
}

impl GameRecord {
    /// Combine a scanned entry with its cached metadata.
    pub fn from_parts(raw: &RawGameEntry, entry: &CacheEntry) -> Self {
        Self {
            identity: raw.identity.clone(),
            display_name: raw.display_name.clone(),
            executable_path: raw.executable_path.clone(),
            last_modified: raw.last_modified,
            size_bytes: raw.size_bytes,
            category: entry.category.clone(),
            tags: entry.tags.clone(),
            favorite: entry.favorite,
            last_played_at: entry.last_played_at,
            play_count: entry.play_count,
        }
    }

    /// Returns a user-facing label, marking favorites with a star.
    pub fn display_label(&self) -> String {
        if self.favorite {
            format!("★ {}", self.display_name)
        } else {
            self.display_name.clone()
        }
    }
}
