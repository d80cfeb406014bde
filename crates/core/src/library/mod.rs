//! Game discovery, change tracking and cache reconciliation.

/// Explicit user edits to cached metadata.
pub mod edit;
/// Launching games and recording play statistics.
pub mod launch;
/// Search, filter and sort helpers for presentation layers.
pub mod query;
/// Merging scans with cached metadata.
pub mod reconcile;
/// Game directory discovery.
pub mod scanner;
/// Debounced filesystem watching.
pub mod watcher;

pub use edit::{apply_edit, MetadataEdit};
pub use launch::{record_launch, spawn_detached};
pub use query::{
    filter_games, format_last_played, format_size, sort_games, unique_categories, unique_tags,
    SortKey,
};
pub use reconcile::reconcile;
pub use scanner::{scan, ExecutableRule};
pub use watcher::{watch, ChangeWatcher, Debouncer, WatchHandle};
