use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{error::ScanError, models::RawGameEntry};

/// Rule deciding which file inside a game directory is its launch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableRule {
    extensions: Vec<String>,
}

impl ExecutableRule {
    /// Accept files whose extension matches one of `extensions`, ignoring case.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Whether `path` qualifies as an executable under this rule.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// Enumerate game directories beneath `root`.
///
/// Every immediate, non-hidden subdirectory holding at least one matching
/// executable yields one entry. Directories are visited in file-name order and
/// the lexically first matching file wins, so repeated scans of the same tree
/// produce identical output.
pub fn scan(root: &Path, rule: &ExecutableRule) -> Result<Vec<RawGameEntry>, ScanError> {
    let unreadable = |source: std::io::Error| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };

    let mut folders: Vec<_> = fs::read_dir(root)
        .map_err(unreadable)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| !is_hidden(&entry.file_name().to_string_lossy()))
        .collect();

    folders.sort_by_key(|entry| entry.file_name());

    let mut games = Vec::new();
    for entry in folders {
        let dir = entry.path();
        let executable = match select_executable(&dir, rule) {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!(dir = %dir.display(), "Skipping directory without executable");
                continue;
            }
            Err(err) => {
                warn!(dir = %dir.display(), "Skipping unreadable game directory: {err}");
                continue;
            }
        };

        let last_modified = fs::metadata(&dir)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        games.push(RawGameEntry {
            identity: dir.clone(),
            display_name: entry.file_name().to_string_lossy().to_string(),
            executable_path: executable,
            last_modified,
            size_bytes: directory_size(&dir),
        });
    }

    debug!(root = %root.display(), total = games.len(), "Scan complete");
    Ok(games)
}

fn select_executable(dir: &Path, rule: &ExecutableRule) -> std::io::Result<Option<PathBuf>> {
    let mut files: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .collect();

    files.sort_by_key(|entry| entry.file_name());

    Ok(files
        .into_iter()
        .map(|entry| entry.path())
        .find(|path| rule.matches(path)))
}

fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
