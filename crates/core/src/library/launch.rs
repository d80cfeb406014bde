use std::{
    path::Path,
    process::{Command, Stdio},
    thread,
};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{error::LaunchError, models::GameCache};

/// Bump launch statistics for `executable`.
///
/// Unknown executables leave the cache untouched: a game must have been
/// registered by a reconciliation pass before it can be launched.
pub fn record_launch(mut cache: GameCache, executable: &Path) -> GameCache {
    match cache.get_mut(executable) {
        Some(entry) => {
            entry.last_played_at = Some(Utc::now());
            entry.play_count = entry.play_count.saturating_add(1);
        }
        None => debug!(path = %executable.display(), "Launch of unregistered executable"),
    }
    cache
}

/// Start `executable` detached from this process.
///
/// The child runs from its own directory with null stdio, in its own process
/// group on unix. A background thread reaps it on exit.
pub fn spawn_detached(executable: &Path) -> Result<(), LaunchError> {
    if !executable.is_file() {
        return Err(LaunchError::NotFound(executable.to_path_buf()));
    }

    let mut command = Command::new(executable);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = executable.parent() {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|source| LaunchError::SpawnFailed {
        path: executable.to_path_buf(),
        source,
    })?;
    let pid = child.id();
    info!(path = %executable.display(), pid, "Game launched");

    thread::spawn(move || match child.wait() {
        Ok(status) => debug!(pid, %status, "Game exited"),
        Err(err) => warn!(pid, "Failed to wait for game process: {err}"),
    });
    Ok(())
}
