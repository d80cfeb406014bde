use std::{collections::BTreeSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::EditError,
    models::{CacheEntry, GameCache, DEFAULT_CATEGORY},
};

/// Explicit user change to a game's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MetadataEdit {
    /// Pin or unpin the game.
    SetFavorite(bool),
    /// Flip the favorite flag.
    ToggleFavorite,
    /// Move the game to a category; blank resets to the default category.
    SetCategory(String),
    /// Replace all tags.
    SetTags(BTreeSet<String>),
    /// Add a single tag.
    AddTag(String),
    /// Remove a single tag.
    RemoveTag(String),
}

impl MetadataEdit {
    fn apply(self, entry: &mut CacheEntry) {
        match self {
            Self::SetFavorite(value) => entry.favorite = value,
            Self::ToggleFavorite => entry.favorite = !entry.favorite,
            Self::SetCategory(category) => {
                let category = category.trim();
                entry.category = if category.is_empty() {
                    DEFAULT_CATEGORY.to_string()
                } else {
                    category.to_string()
                };
            }
            Self::SetTags(tags) => {
                entry.tags = tags.iter().filter_map(|tag| normalize_tag(tag)).collect();
            }
            Self::AddTag(tag) => {
                if let Some(tag) = normalize_tag(&tag) {
                    entry.tags.insert(tag);
                }
            }
            Self::RemoveTag(tag) => {
                entry.tags.remove(tag.trim());
            }
        }
    }
}

/// Apply `edit` to the entry for `executable`.
///
/// Launch statistics are never touched by edits.
pub fn apply_edit(
    cache: &mut GameCache,
    executable: &Path,
    edit: MetadataEdit,
) -> Result<(), EditError> {
    let entry = cache
        .get_mut(executable)
        .ok_or_else(|| EditError::UnknownGame(executable.to_path_buf()))?;
    edit.apply(entry);
    Ok(())
}

fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_string())
}
