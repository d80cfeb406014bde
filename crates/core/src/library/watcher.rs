use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::error::WatchError;

use super::scanner::is_hidden;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Deferred callback that is pushed back every time it is triggered.
///
/// Each [`trigger`](Self::trigger) aborts the pending task and schedules a
/// new one `window` in the future, so the callback fires once per burst after
/// the burst has gone quiet.
pub struct Debouncer {
    window: Duration,
    runtime: Handle,
    callback: Callback,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer that schedules on `runtime`.
    pub fn new<F>(window: Duration, runtime: Handle, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            window,
            runtime,
            callback: Arc::new(callback),
            pending: Mutex::new(None),
        }
    }

    /// Reschedule the callback to run after a full quiet window.
    pub fn trigger(&self) {
        let mut pending = self.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }
        let callback = Arc::clone(&self.callback);
        let window = self.window;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            callback();
        }));
    }

    /// Drop any scheduled callback without running it.
    pub fn cancel(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Live subscription to a games directory.
///
/// Dropping the handle has the same effect as [`stop`](Self::stop).
pub struct WatchHandle {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    debouncer: Arc<Debouncer>,
}

impl WatchHandle {
    /// Directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release the OS watch and discard any pending notification.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            self.debouncer.cancel();
            debug!(root = %self.root.display(), "Stopped watching");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watch `root` recursively and call `on_change` once per burst of changes.
///
/// Create, remove and modify events are considered; access events and
/// anything beneath a dot-prefixed entry are ignored. Must be called from
/// within a tokio runtime, which is used to schedule the debounced callback.
pub fn watch<F>(root: &Path, window: Duration, on_change: F) -> Result<WatchHandle, WatchError>
where
    F: Fn() + Send + Sync + 'static,
{
    let failed = |source: notify::Error| WatchError::SubscriptionFailed {
        path: root.to_path_buf(),
        source,
    };

    let runtime =
        Handle::try_current().map_err(|err| failed(notify::Error::generic(&err.to_string())))?;
    let debouncer = Arc::new(Debouncer::new(window, runtime, on_change));

    let roots = watched_roots(root);
    let trigger = Arc::clone(&debouncer);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&roots, &event) => trigger.trigger(),
        Ok(_) => {}
        Err(err) => warn!("Filesystem watcher error: {err}"),
    })
    .map_err(failed)?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(failed)?;
    info!(root = %root.display(), window_ms = window.as_millis() as u64, "Watching games directory");

    Ok(WatchHandle {
        root: root.to_path_buf(),
        watcher: Some(watcher),
        debouncer,
    })
}

/// Owner of at most one active subscription.
#[derive(Default)]
pub struct ChangeWatcher {
    active: Option<WatchHandle>,
}

impl ChangeWatcher {
    /// Create a watcher with no active subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current subscription with one on `root`.
    ///
    /// The previous subscription is fully stopped first, even if the new one
    /// cannot be established.
    pub fn rewatch<F>(&mut self, root: &Path, window: Duration, on_change: F) -> Result<(), WatchError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop();
        self.active = Some(watch(root, window, on_change)?);
        Ok(())
    }

    /// Stop the active subscription, if any.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
        }
    }

    /// Directory currently watched.
    pub fn root(&self) -> Option<&Path> {
        self.active.as_ref().map(WatchHandle::root)
    }

    /// Whether live updates are active.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

fn watched_roots(root: &Path) -> Vec<PathBuf> {
    let mut roots = vec![root.to_path_buf()];
    if let Ok(canonical) = root.canonicalize() {
        if canonical != root {
            roots.push(canonical);
        }
    }
    roots
}

fn is_relevant(roots: &[PathBuf], event: &Event) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
    );
    kind_matches && event.paths.iter().any(|path| !is_hidden_path(roots, path))
}

fn is_hidden_path(roots: &[PathBuf], path: &Path) -> bool {
    let relative = roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(path.file_name().unwrap_or_default()));
    relative
        .components()
        .any(|component| is_hidden(&component.as_os_str().to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::{
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::tempdir;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_callback() {
        let (count, callback) = counter();
        let debouncer = Debouncer::new(Duration::from_millis(1000), Handle::current(), callback);

        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_events_fire_separately() {
        let (count, callback) = counter();
        let debouncer = Debouncer::new(Duration::from_millis(1000), Handle::current(), callback);

        for _ in 0..3 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_callback() {
        let (count, callback) = counter();
        let debouncer = Debouncer::new(Duration::from_millis(100), Handle::current(), callback);

        debouncer.trigger();
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hidden_and_access_events_are_ignored() {
        let roots = vec![PathBuf::from("/home/me/.games")];
        let visible = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/home/me/.games/Doom/doom.exe"));
        let hidden = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/home/me/.games/Doom/.cache/shader.bin"));
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/home/me/.games/Doom/doom.exe"));

        assert!(is_relevant(&roots, &visible));
        assert!(!is_relevant(&roots, &hidden));
        assert!(!is_relevant(&roots, &access));
    }

    #[tokio::test]
    async fn filesystem_changes_notify_once_per_burst() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (count, callback) = counter();
        let handle = watch(temp.path(), Duration::from_millis(200), callback)?;
        assert_eq!(handle.root(), temp.path());

        fs::create_dir_all(temp.path().join("Doom"))?;
        fs::write(temp.path().join("Doom/doom.exe"), b"bin")?;
        fs::write(temp.path().join("Doom/readme.txt"), b"text")?;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        fs::write(temp.path().join(".hidden"), b"ignored")?;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.stop();
        fs::write(temp.path().join("Doom/patch.exe"), b"bin")?;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rewatch_switches_roots() -> anyhow::Result<()> {
        let first = tempdir()?;
        let second = tempdir()?;
        let mut watcher = ChangeWatcher::new();
        let (count, callback) = counter();
        let callback = Arc::new(callback);

        let cb = Arc::clone(&callback);
        watcher.rewatch(first.path(), Duration::from_millis(100), move || cb())?;
        let cb = Arc::clone(&callback);
        watcher.rewatch(second.path(), Duration::from_millis(100), move || cb())?;
        assert_eq!(watcher.root(), Some(second.path()));

        fs::write(first.path().join("old.exe"), b"bin")?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        fs::write(second.path().join("new.exe"), b"bin")?;
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        watcher.stop();
        assert!(!watcher.is_active());
        Ok(())
    }

    #[tokio::test]
    async fn missing_root_fails_to_subscribe() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing");
        let (_, callback) = counter();
        match watch(&missing, Duration::from_millis(100), callback) {
            Err(WatchError::SubscriptionFailed { path, .. }) => assert_eq!(path, missing),
            Ok(_) => panic!("watching a missing directory should fail"),
        }
    }
}
