//! Error taxonomy for the library core.
//!
//! None of these are fatal: the service reports them as status messages or
//! command results and keeps running.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to enumerate the configured root directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root directory is missing or cannot be listed.
    #[error("games directory {} is unreadable: {source}", path.display())]
    RootUnreadable {
        /// Directory that could not be listed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to subscribe to filesystem events.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The OS watch could not be established.
    #[error("failed to watch {}: {source}", path.display())]
    SubscriptionFailed {
        /// Directory the watch was requested for.
        path: PathBuf,
        /// Error reported by the watcher backend.
        #[source]
        source: notify::Error,
    },
}

/// Failure to start a game.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The executable no longer exists.
    #[error("executable not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The executable is not part of the library.
    #[error("{} is not a game in the library", .0.display())]
    Unregistered(PathBuf),
    /// The OS refused to start the process.
    #[error("failed to start {}: {source}", path.display())]
    SpawnFailed {
        /// Executable that failed to start.
        path: PathBuf,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure to apply a metadata edit.
#[derive(Debug, Error)]
pub enum EditError {
    /// No cache entry exists for the executable.
    #[error("no game registered for {}", .0.display())]
    UnknownGame(PathBuf),
}

/// Errors returned by [`crate::service::LibraryHandle`] commands.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The library service has shut down.
    #[error("library service is not running")]
    Closed,
    /// Scanning failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// Launching failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// Editing failed.
    #[error(transparent)]
    Edit(#[from] EditError),
    /// The requested root is not a directory.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    /// A background scan panicked or was cancelled.
    #[error("background scan failed: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
    /// Persisting state failed.
    #[error("failed to persist library state: {0:#}")]
    Store(anyhow::Error),
}
