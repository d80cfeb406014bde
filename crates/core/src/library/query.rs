use std::{cmp::Ordering, collections::BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::GameRecord;

/// Ordering applied to a game list by presentation layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Keep scan order.
    #[default]
    Unsorted,
    /// Display name, case-insensitive ascending.
    Name,
    /// Most recently played first; never-played games last.
    LastPlayed,
    /// Most launched first.
    PlayCount,
    /// Largest first.
    Size,
}

impl SortKey {
    /// Next key in the cycle used by interactive frontends.
    pub fn next(self) -> Self {
        match self {
            Self::Unsorted => Self::Name,
            Self::Name => Self::LastPlayed,
            Self::LastPlayed => Self::PlayCount,
            Self::PlayCount => Self::Size,
            Self::Size => Self::Unsorted,
        }
    }

    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unsorted => "scan order",
            Self::Name => "name",
            Self::LastPlayed => "last played",
            Self::PlayCount => "play count",
            Self::Size => "size",
        }
    }
}

/// Games matching a search query, category and favorites flag.
///
/// The query is matched case-insensitively against the display name and each
/// tag. `category = None` accepts every category.
pub fn filter_games(
    games: &[GameRecord],
    query: &str,
    category: Option<&str>,
    favorites_only: bool,
) -> Vec<GameRecord> {
    let needle = query.trim().to_lowercase();
    games
        .iter()
        .filter(|game| {
            needle.is_empty()
                || game.display_name.to_lowercase().contains(&needle)
                || game
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .filter(|game| category.map_or(true, |category| game.category == category))
        .filter(|game| !favorites_only || game.favorite)
        .cloned()
        .collect()
}

/// Return a copy of `games` ordered by `key`. The sort is stable.
pub fn sort_games(games: &[GameRecord], key: SortKey) -> Vec<GameRecord> {
    let mut sorted = games.to_vec();
    match key {
        SortKey::Unsorted => {}
        SortKey::Name => sorted.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        }),
        SortKey::LastPlayed => sorted.sort_by(|a, b| match (a.last_played_at, b.last_played_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortKey::PlayCount => sorted.sort_by(|a, b| b.play_count.cmp(&a.play_count)),
        SortKey::Size => sorted.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes)),
    }
    sorted
}

/// Distinct categories, sorted.
pub fn unique_categories(games: &[GameRecord]) -> Vec<String> {
    games
        .iter()
        .map(|game| game.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct tags across all games, sorted.
pub fn unique_tags(games: &[GameRecord]) -> Vec<String> {
    games
        .iter()
        .flat_map(|game| game.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Human-readable size with one decimal, e.g. `1.5 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Relative description of when a game was last played, as seen at `now`.
///
/// Under an hour reads in minutes, under a day in hours, under two days as
/// `Yesterday`, and anything older as a calendar date.
pub fn format_last_played(last_played_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = last_played_at else {
        return "Never".to_string();
    };
    let elapsed = (now - at).max(chrono::Duration::zero());
    if elapsed < chrono::Duration::hours(1) {
        let minutes = elapsed.num_minutes();
        format!("{minutes} minute{} ago", if minutes == 1 { "" } else { "s" })
    } else if elapsed < chrono::Duration::hours(24) {
        let hours = elapsed.num_hours();
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else if elapsed < chrono::Duration::hours(48) {
        "Yesterday".to_string()
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}
