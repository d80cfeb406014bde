//! Library owner task.
//!
//! A single task owns the store, the cache, the watcher and the last scan.
//! Everything that touches the cache goes through its command queue, so
//! reconciliation passes never interleave. Watcher triggers collapse into at
//! most one queued rescan.

use std::{
    fs, mem,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Result;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    error::{LaunchError, ServiceError},
    library::{
        apply_edit, reconcile, record_launch, scan, spawn_detached, ChangeWatcher,
        ExecutableRule, MetadataEdit,
    },
    models::{GameRecord, RawGameEntry},
    store::{PersistentStore, StoreState},
};

const EVENT_CAPACITY: usize = 64;

/// Events published by the library service.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    /// A reconciled game list, in scan order.
    GamesUpdated(Vec<GameRecord>),
    /// Free-form progress or error text for the status line.
    StatusMessage(String),
    /// Live updates are disabled; only manual rescans refresh the list.
    WatchFailed(String),
}

enum Command {
    RootDirectory(oneshot::Sender<Option<PathBuf>>),
    SetRootDirectory(PathBuf, oneshot::Sender<Result<PathBuf, ServiceError>>),
    Launch(PathBuf, oneshot::Sender<Result<(), ServiceError>>),
    Rescan(Option<oneshot::Sender<Result<usize, ServiceError>>>),
    Edit(
        PathBuf,
        MetadataEdit,
        oneshot::Sender<Result<(), ServiceError>>,
    ),
    Games(oneshot::Sender<Vec<GameRecord>>),
    Shutdown,
}

/// Cloneable handle used by presentation layers to talk to the service.
#[derive(Clone)]
pub struct LibraryHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LibraryEvent>,
}

impl LibraryHandle {
    /// Subscribe to library events.
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    /// Currently configured games directory.
    pub async fn root_directory(&self) -> Result<Option<PathBuf>, ServiceError> {
        self.request(Command::RootDirectory).await
    }

    /// Switch to a new games directory, restarting the watcher and rescanning.
    pub async fn set_root_directory(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<PathBuf, ServiceError> {
        let path = path.into();
        self.request(|reply| Command::SetRootDirectory(path, reply)).await?
    }

    /// Launch a game and record the launch once the process has started.
    pub async fn launch_game(&self, executable: impl Into<PathBuf>) -> Result<(), ServiceError> {
        let executable = executable.into();
        self.request(|reply| Command::Launch(executable, reply)).await?
    }

    /// Rescan now, returning the number of games found.
    pub async fn request_rescan(&self) -> Result<usize, ServiceError> {
        self.request(|reply| Command::Rescan(Some(reply))).await?
    }

    /// Apply a user edit to a game's metadata.
    pub async fn edit_game(
        &self,
        executable: impl Into<PathBuf>,
        edit: MetadataEdit,
    ) -> Result<(), ServiceError> {
        let executable = executable.into();
        self.request(|reply| Command::Edit(executable, edit, reply)).await?
    }

    /// Latest reconciled game list.
    pub async fn games(&self) -> Result<Vec<GameRecord>, ServiceError> {
        self.request(Command::Games).await
    }

    /// Publish a status line on behalf of another collaborator, such as an update checker.
    pub fn post_status(&self, message: impl Into<String>) {
        let _ = self.events.send(LibraryEvent::StatusMessage(message.into()));
    }

    /// Ask the service to stop. Pending commands queued before this are still processed.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)
    }
}

/// The task that owns all library state.
pub struct LibraryService {
    config: AppConfig,
    rule: ExecutableRule,
    store: PersistentStore,
    state: StoreState,
    last_scan: Vec<RawGameEntry>,
    games: Vec<GameRecord>,
    watcher: ChangeWatcher,
    events: broadcast::Sender<LibraryEvent>,
    commands: mpsc::WeakUnboundedSender<Command>,
    rescan_queued: Arc<AtomicBool>,
}

impl LibraryService {
    /// Load persisted state and start the service on the current tokio runtime.
    ///
    /// The returned receiver is subscribed before the first scan runs, so it
    /// observes the initial game list. The task ends after
    /// [`LibraryHandle::shutdown`] or once every handle has been dropped.
    pub fn spawn(
        config: AppConfig,
    ) -> Result<(LibraryHandle, broadcast::Receiver<LibraryEvent>, JoinHandle<()>)> {
        let (service, handle, events, commands) = Self::new(config)?;
        let task = tokio::spawn(service.run(commands));
        Ok((handle, events, task))
    }

    #[allow(clippy::type_complexity)]
    fn new(
        config: AppConfig,
    ) -> Result<(
        Self,
        LibraryHandle,
        broadcast::Receiver<LibraryEvent>,
        mpsc::UnboundedReceiver<Command>,
    )> {
        let store = PersistentStore::new(&config.store_path);
        let mut state = store.load()?;

        let root = match state.root_directory.clone() {
            Some(root) => root,
            None => {
                let root = config.default_games_dir.clone();
                state.root_directory = Some(root.clone());
                store.persist(&state)?;
                root
            }
        };
        if !root.exists() {
            match fs::create_dir_all(&root) {
                Ok(()) => info!(root = %root.display(), "Created games directory"),
                Err(err) => warn!(root = %root.display(), "Failed to create games directory: {err}"),
            }
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(EVENT_CAPACITY);

        let service = Self {
            rule: ExecutableRule::new(&config.executable_extensions),
            config,
            store,
            state,
            last_scan: Vec::new(),
            games: Vec::new(),
            watcher: ChangeWatcher::new(),
            events: event_tx.clone(),
            commands: command_tx.downgrade(),
            rescan_queued: Arc::new(AtomicBool::new(false)),
        };
        let handle = LibraryHandle {
            commands: command_tx,
            events: event_tx,
        };
        Ok((service, handle, event_rx, command_rx))
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(root = %self.root().display(), "Library service started");
        self.restart_watcher();
        if let Err(err) = self.rescan().await {
            warn!("Initial scan failed: {err}");
        }

        while let Some(command) = commands.recv().await {
            match command {
                Command::RootDirectory(reply) => {
                    let _ = reply.send(self.state.root_directory.clone());
                }
                Command::SetRootDirectory(path, reply) => {
                    let _ = reply.send(self.set_root(path).await);
                }
                Command::Launch(executable, reply) => {
                    let _ = reply.send(self.launch(executable));
                }
                Command::Rescan(reply) => {
                    let result = self.rescan().await;
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(err) = result {
                                debug!("Triggered rescan failed: {err}");
                            }
                        }
                    }
                }
                Command::Edit(executable, edit, reply) => {
                    let _ = reply.send(self.edit(executable, edit));
                }
                Command::Games(reply) => {
                    let _ = reply.send(self.games.clone());
                }
                Command::Shutdown => break,
            }
        }

        self.watcher.stop();
        info!("Library service stopped");
    }

    fn root(&self) -> PathBuf {
        self.state
            .root_directory
            .clone()
            .unwrap_or_else(|| self.config.default_games_dir.clone())
    }

    async fn set_root(&mut self, path: PathBuf) -> Result<PathBuf, ServiceError> {
        if !path.is_dir() {
            return Err(ServiceError::NotADirectory(path));
        }

        let previous = self.state.root_directory.replace(path.clone());
        if let Err(err) = self.persist() {
            self.state.root_directory = previous;
            return Err(err);
        }
        info!(root = %path.display(), "Games directory changed");
        self.restart_watcher();
        self.rescan().await?;
        Ok(path)
    }

    fn restart_watcher(&mut self) {
        if !self.config.watch_enabled {
            self.watcher.stop();
            return;
        }

        let root = self.root();
        let on_change = self.rescan_trigger();
        if let Err(err) = self
            .watcher
            .rewatch(&root, self.config.debounce_window(), on_change)
        {
            warn!("Live updates disabled: {err}");
            self.status(format!("Live updates disabled: {err}"));
            let _ = self.events.send(LibraryEvent::WatchFailed(err.to_string()));
        }
    }

    /// Callback that queues a rescan unless one is already waiting.
    fn rescan_trigger(&self) -> impl Fn() + Send + Sync + 'static {
        let queued = Arc::clone(&self.rescan_queued);
        let commands = self.commands.clone();
        move || {
            if queued.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Rescan(None));
            }
        }
    }

    async fn rescan(&mut self) -> Result<usize, ServiceError> {
        self.rescan_queued.store(false, Ordering::SeqCst);

        let root = self.root();
        let rule = self.rule.clone();
        let scanned = tokio::task::spawn_blocking(move || scan(&root, &rule)).await?;
        let raw = match scanned {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Scan failed: {err}");
                self.status(format!("Scan failed: {err}"));
                return Err(err.into());
            }
        };

        self.last_scan = raw;
        self.sync()?;
        info!(total = self.games.len(), "Games reconciled");
        Ok(self.games.len())
    }

    fn launch(&mut self, executable: PathBuf) -> Result<(), ServiceError> {
        if !self.state.game_cache.contains_key(&executable) {
            warn!(path = %executable.display(), "Refusing to launch unregistered executable");
            return Err(LaunchError::Unregistered(executable).into());
        }
        if let Err(err) = spawn_detached(&executable) {
            error!("Launch failed: {err}");
            self.status(format!("Launch failed: {err}"));
            return Err(err.into());
        }

        let cache = mem::take(&mut self.state.game_cache);
        self.state.game_cache = record_launch(cache, &executable);
        self.sync()
    }

    fn edit(&mut self, executable: PathBuf, edit: MetadataEdit) -> Result<(), ServiceError> {
        apply_edit(&mut self.state.game_cache, &executable, edit)?;
        self.sync()
    }

    /// Merge the last scan with the cache, persist, and publish the result.
    ///
    /// The list is published even when persisting fails; the in-memory state
    /// stays authoritative and the next successful write catches up.
    fn sync(&mut self) -> Result<(), ServiceError> {
        let cache = mem::take(&mut self.state.game_cache);
        let (games, cache) = reconcile(&self.last_scan, cache);
        self.state.game_cache = cache;
        self.games = games;

        let persisted = self.persist();
        let _ = self
            .events
            .send(LibraryEvent::GamesUpdated(self.games.clone()));
        persisted
    }

    fn persist(&self) -> Result<(), ServiceError> {
        self.store.persist(&self.state).map_err(|err| {
            error!("Failed to persist library state: {err:#}");
            self.status(format!("Failed to save library: {err}"));
            ServiceError::Store(err)
        })
    }

    fn status(&self, message: String) {
        let _ = self.events.send(LibraryEvent::StatusMessage(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use tokio::sync::broadcast::error::TryRecvError;
    use std::{path::Path, time::Duration};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        config: AppConfig,
    }

    fn fixture(watch_enabled: bool) -> Fixture {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("games");
        fs::create_dir_all(&root).expect("games dir");
        let config = AppConfig {
            store_path: temp.path().join("state/library.json"),
            default_games_dir: root.clone(),
            debounce_ms: 100,
            executable_extensions: vec!["exe".to_string()],
            watch_enabled,
        };
        Fixture {
            _temp: temp,
            root,
            config,
        }
    }

    fn add_game(root: &Path, name: &str, exe: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("game dir");
        let path = dir.join(exe);
        fs::write(&path, "#!/bin/sh\nexit 0\n").expect("executable");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        path
    }

    async fn next_games(events: &mut broadcast::Receiver<LibraryEvent>) -> Vec<GameRecord> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(LibraryEvent::GamesUpdated(games)) => return games,
                    Ok(_) => continue,
                    Err(err) => panic!("event stream closed: {err}"),
                }
            }
        })
        .await
        .expect("timed out waiting for games")
    }

    fn assert_no_games_update(events: &mut broadcast::Receiver<LibraryEvent>) {
        loop {
            match events.try_recv() {
                Ok(LibraryEvent::GamesUpdated(games)) => {
                    panic!("unexpected extra game list with {} games", games.len())
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) => break,
                Err(err) => panic!("event stream failed: {err}"),
            }
        }
    }

    #[tokio::test]
    async fn initial_scan_publishes_defaults_and_persists() -> anyhow::Result<()> {
        let fx = fixture(false);
        add_game(&fx.root, "A", "app.exe");
        fs::create_dir_all(fx.root.join("B"))?;
        add_game(&fx.root, "C", "run.exe");

        let (handle, mut events, task) = LibraryService::spawn(fx.config.clone())?;
        let games = next_games(&mut events).await;
        assert_eq!(games.len(), 2);
        assert!(games.iter().all(|g| g.category == "Uncategorized" && g.play_count == 0));
        assert_eq!(handle.root_directory().await?, Some(fx.root.clone()));

        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert_eq!(stored.root_directory, Some(fx.root.clone()));
        assert_eq!(stored.game_cache.len(), 2);

        handle.shutdown();
        task.await?;
        assert!(matches!(handle.games().await, Err(ServiceError::Closed)));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_is_persisted_and_survives_rescan() -> anyhow::Result<()> {
        let fx = fixture(false);
        let exe = add_game(&fx.root, "A", "app.exe");
        add_game(&fx.root, "C", "run.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        next_games(&mut events).await;

        handle.launch_game(&exe).await?;
        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert_eq!(stored.game_cache[&exe].play_count, 1);
        assert!(stored.game_cache[&exe].last_played_at.is_some());

        assert_eq!(handle.request_rescan().await?, 2);
        let games = handle.games().await?;
        let game = games.iter().find(|g| g.executable_path == exe).unwrap();
        assert_eq!(game.play_count, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unregistered_executables_are_not_launched() -> anyhow::Result<()> {
        let fx = fixture(false);
        add_game(&fx.root, "A", "app.exe");
        let outside = fx.root.parent().unwrap().join("elsewhere");
        let marker = outside.join("ran");
        let exe = add_game(&outside, "X", "x.exe");
        fs::write(&exe, format!("#!/bin/sh\ntouch '{}'\n", marker.display()))?;

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        next_games(&mut events).await;

        let result = handle.launch_game(&exe).await;
        assert!(matches!(
            result,
            Err(ServiceError::Launch(LaunchError::Unregistered(path))) if path == exe
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert!(!stored.game_cache.contains_key(&exe));
        Ok(())
    }

    #[tokio::test]
    async fn failed_launch_leaves_cache_untouched() -> anyhow::Result<()> {
        let fx = fixture(false);
        let exe = add_game(&fx.root, "A", "app.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        next_games(&mut events).await;
        fs::remove_file(&exe)?;

        let result = handle.launch_game(&exe).await;
        assert!(matches!(
            result,
            Err(ServiceError::Launch(LaunchError::NotFound(_)))
        ));
        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert_eq!(stored.game_cache[&exe].play_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn removed_games_keep_cache_and_unreadable_root_keeps_list() -> anyhow::Result<()> {
        let fx = fixture(false);
        let exe = add_game(&fx.root, "A", "app.exe");
        add_game(&fx.root, "C", "run.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        next_games(&mut events).await;
        handle
            .edit_game(&exe, MetadataEdit::SetCategory("Arcade".into()))
            .await?;

        fs::remove_dir_all(fx.root.join("A"))?;
        assert_eq!(handle.request_rescan().await?, 1);
        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert_eq!(stored.game_cache[&exe].category, "Arcade");

        fs::remove_dir_all(&fx.root)?;
        let result = handle.request_rescan().await;
        assert!(matches!(
            result,
            Err(ServiceError::Scan(ScanError::RootUnreadable { .. }))
        ));
        assert_eq!(handle.games().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn switching_roots_rescans_and_persists() -> anyhow::Result<()> {
        let fx = fixture(false);
        add_game(&fx.root, "A", "app.exe");
        let other = fx.root.parent().unwrap().join("other");
        add_game(&other, "X", "x.exe");
        add_game(&other, "Y", "y.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        assert_eq!(next_games(&mut events).await.len(), 1);

        assert_eq!(handle.set_root_directory(&other).await?, other);
        let games = next_games(&mut events).await;
        let names: Vec<_> = games.iter().map(|g| g.display_name.as_str()).collect();
        assert_eq!(names, ["X", "Y"]);

        let stored = PersistentStore::new(&fx.config.store_path).load()?;
        assert_eq!(stored.root_directory, Some(other.clone()));
        assert_eq!(stored.game_cache.len(), 3);

        let missing = other.join("nope");
        assert!(matches!(
            handle.set_root_directory(&missing).await,
            Err(ServiceError::NotADirectory(path)) if path == missing
        ));
        Ok(())
    }

    #[tokio::test]
    async fn watcher_picks_up_new_games() -> anyhow::Result<()> {
        let fx = fixture(true);
        add_game(&fx.root, "A", "app.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        assert_eq!(next_games(&mut events).await.len(), 1);

        add_game(&fx.root, "B", "b.exe");
        let games = next_games(&mut events).await;
        assert_eq!(games.len(), 2);

        handle.post_status("Up to date.");
        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let LibraryEvent::StatusMessage(message) = events.recv().await? {
                    return Ok::<_, broadcast::error::RecvError>(message);
                }
            }
        })
        .await??;
        assert_eq!(status, "Up to date.");
        Ok(())
    }

    #[tokio::test]
    async fn failed_root_switch_keeps_previous_root() -> anyhow::Result<()> {
        let fx = fixture(false);
        add_game(&fx.root, "A", "app.exe");
        let other = fx.root.parent().unwrap().join("other");
        add_game(&other, "X", "x.exe");

        let (handle, mut events, _task) = LibraryService::spawn(fx.config.clone())?;
        next_games(&mut events).await;

        // A non-empty directory at the store path makes the atomic rename fail.
        fs::remove_file(&fx.config.store_path)?;
        fs::create_dir_all(fx.config.store_path.join("blocker"))?;

        let result = handle.set_root_directory(&other).await;
        assert!(matches!(result, Err(ServiceError::Store(_))));
        assert_eq!(handle.root_directory().await?, Some(fx.root.clone()));
        let games = handle.games().await?;
        let names: Vec<_> = games.iter().map(|g| g.display_name.as_str()).collect();
        assert_eq!(names, ["A"]);
        Ok(())
    }

    #[tokio::test]
    async fn triggers_collapse_into_one_queued_rescan() -> anyhow::Result<()> {
        let fx = fixture(false);
        add_game(&fx.root, "A", "app.exe");

        let (service, handle, mut events, commands) = LibraryService::new(fx.config.clone())?;
        let trigger = service.rescan_trigger();
        for _ in 0..5 {
            trigger();
        }
        let _task = tokio::spawn(service.run(commands));

        // Initial scan, then the single queued rescan.
        assert_eq!(next_games(&mut events).await.len(), 1);
        assert_eq!(next_games(&mut events).await.len(), 1);
        handle.games().await?;
        assert_no_games_update(&mut events);

        for _ in 0..3 {
            trigger();
        }
        assert_eq!(next_games(&mut events).await.len(), 1);
        handle.games().await?;
        assert_no_games_update(&mut events);
        Ok(())
    }
}
