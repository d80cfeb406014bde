use crate::models::{CacheEntry, GameCache, GameRecord, RawGameEntry};

/// Merge a fresh scan with cached metadata.
///
/// Filesystem attributes come from `raw`; user and session metadata comes
/// from `cache`, created with defaults for executables seen for the first
/// time. Entries for executables missing from the scan are kept. The output
/// preserves the order of `raw`.
pub fn reconcile(raw: &[RawGameEntry], mut cache: GameCache) -> (Vec<GameRecord>, GameCache) {
    let mut games = Vec::with_capacity(raw.len());
    for entry in raw {
        let cached = cache
            .entry(entry.executable_path.clone())
            .or_insert_with(CacheEntry::default);
        games.push(GameRecord::from_parts(entry, cached));
    }
    (games, cache)
}
