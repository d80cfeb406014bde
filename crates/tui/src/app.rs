use std::{io, path::PathBuf, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gameshelf_core::{
    library::{
        filter_games, format_last_played, format_size, sort_games, unique_categories, SortKey,
    },
    GameRecord, LibraryEvent, LibraryHandle, MetadataEdit,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    favorite: Color,
    warning: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            favorite: Color::Yellow,
            warning: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Filter,
}

enum AppEvent {
    Input(Event),
    Tick,
}

/// Terminal browser for the game library.
pub struct GameShelfApp {
    library: LibraryHandle,
    events_rx: Option<broadcast::Receiver<LibraryEvent>>,
    state: UiState,
    root: Option<PathBuf>,
    theme: Theme,
}

impl GameShelfApp {
    pub fn new(library: LibraryHandle) -> Self {
        Self {
            library,
            events_rx: None,
            state: UiState::default(),
            root: None,
            theme: Theme::default(),
        }
    }

    pub fn attach_events(&mut self, receiver: broadcast::Receiver<LibraryEvent>) {
        self.events_rx = Some(receiver);
    }

    pub fn set_status(&mut self, message: String) {
        self.state.set_status(message);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.root = self.library.root_directory().await?;

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx);

        let mut library_rx = self.events_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            if let Some(rx) = library_rx.as_mut() {
                let mut library_closed = false;
                tokio::select! {
                    maybe_event = event_rx.recv() => {
                        if !self.process_app_event(maybe_event).await {
                            break;
                        }
                    }
                    library_event = rx.recv() => {
                        match library_event {
                            Ok(event) => self.handle_library_event(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Library events lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => library_closed = true,
                        }
                    }
                }
                if library_closed {
                    library_rx = None;
                }
            } else {
                let maybe_event = event_rx.recv().await;
                if !self.process_app_event(maybe_event).await {
                    break;
                }
            }
        }

        restore_terminal(&mut terminal)?;
        Ok(())
    }

    fn handle_library_event(&mut self, event: LibraryEvent) {
        match event {
            LibraryEvent::GamesUpdated(games) => {
                info!(total = games.len(), "Game list updated");
                let first_load = !self.state.loaded;
                self.state.set_games(games);
                if first_load {
                    self.state
                        .set_status(format!("{} games in library", self.state.all_games.len()));
                }
            }
            LibraryEvent::StatusMessage(message) => self.state.set_status(message),
            LibraryEvent::WatchFailed(reason) => {
                self.state.live_updates = false;
                self.state
                    .set_status(format!("Live updates off ({reason}); press r to rescan"));
            }
        }
    }

    async fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if let Err(err) = self.handle_key(key).await {
                    error!(?err, "Command failed");
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Input(_)) => true,
            Some(AppEvent::Tick) => true,
            None => false,
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.state.mode {
            Mode::Filter => {
                self.handle_filter_key(key);
                Ok(())
            }
            Mode::Browse => self.handle_browse_key(key).await,
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.mode = Mode::Browse;
                self.state.filter.clear();
                self.state.apply_filter();
                self.state.set_status("Filter cancelled".to_string());
            }
            KeyCode::Enter => {
                self.state.mode = Mode::Browse;
                self.state
                    .set_status(format!("Filter applied: {}", self.state.filter));
            }
            KeyCode::Backspace => {
                self.state.filter.pop();
                self.state.apply_filter();
            }
            KeyCode::Char(c) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.state.filter.push(c);
                    self.state.apply_filter();
                }
            }
            _ => {}
        }
    }

    async fn handle_browse_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') if key.modifiers.is_empty() => self.state.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1),
            KeyCode::Char('g') if key.modifiers.is_empty() => self.state.move_to(0),
            KeyCode::Char('G') => self.state.move_to_end(),
            KeyCode::Home => self.state.move_to(0),
            KeyCode::End => self.state.move_to_end(),
            KeyCode::PageDown => self.state.page_down(),
            KeyCode::PageUp => self.state.page_up(),
            KeyCode::Char('/') => {
                self.state.mode = Mode::Filter;
                self.state.set_status("Enter filter text".to_string());
            }
            KeyCode::Char('s') if key.modifiers.is_empty() => {
                self.state.sort = self.state.sort.next();
                self.state.apply_filter();
                self.state
                    .set_status(format!("Sorted by {}", self.state.sort.label()));
            }
            KeyCode::Char('F') => {
                self.state.favorites_only = !self.state.favorites_only;
                self.state.apply_filter();
                let message = if self.state.favorites_only {
                    "Showing favorites only"
                } else {
                    "Showing all games"
                };
                self.state.set_status(message.to_string());
            }
            KeyCode::Char('c') if key.modifiers.is_empty() => {
                self.state.cycle_category();
                let label = self.state.category.as_deref().unwrap_or("all");
                self.state.set_status(format!("Category: {label}"));
            }
            KeyCode::Char('f') if key.modifiers.is_empty() => {
                if let Some(game) = self.state.current_game() {
                    let path = game.executable_path.clone();
                    self.library
                        .edit_game(path, MetadataEdit::ToggleFavorite)
                        .await?;
                }
            }
            KeyCode::Char('r') if key.modifiers.is_empty() => {
                let total = self.library.request_rescan().await?;
                self.state.set_status(format!("Rescanned: {total} games"));
            }
            KeyCode::Enter => {
                if let Some(game) = self.state.current_game() {
                    let name = game.display_name.clone();
                    let path = game.executable_path.clone();
                    self.library.launch_game(path).await?;
                    self.state.set_status(format!("Launched {name}"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(4)])
            .split(size);

        let body_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[0]);

        self.render_game_list(frame, body_chunks[0]);
        self.render_game_info(frame, body_chunks[1]);
        self.render_status(frame, chunks[1]);
    }

    fn render_game_list(&mut self, frame: &mut Frame, area: Rect) {
        self.state.list_height = area.height.saturating_sub(2) as usize;
        self.state.clamp_cursor();
        self.state.ensure_cursor_visible();

        let mut list_state = ListState::default();
        let games = self.state.visible_games(self.state.list_height);
        if !games.is_empty() {
            let selected = self
                .state
                .cursor
                .saturating_sub(self.state.offset)
                .min(games.len().saturating_sub(1));
            list_state.select(Some(selected));
        }
        let items: Vec<ListItem> = games
            .iter()
            .enumerate()
            .map(|(idx, game)| {
                let is_selected = self.state.cursor == self.state.offset + idx;
                let marker = if is_selected {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                let title_color = if game.favorite {
                    self.theme.favorite
                } else {
                    self.theme.primary_fg
                };
                let title = Span::styled(
                    game.display_label(),
                    Style::default()
                        .fg(title_color)
                        .add_modifier(Modifier::BOLD),
                );
                let plays = Span::styled(
                    format!(" · {} plays", game.play_count),
                    Style::default().fg(self.theme.muted),
                );
                ListItem::new(Line::from(vec![marker, title, plays]))
            })
            .collect();

        let title = format!("Games ({}/{})", self.state.filtered.len(), self.state.all_games.len());
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_game_info(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Game Details");
        let Some(game) = self.state.current_game() else {
            let message = if self.state.all_games.is_empty() {
                "No games found. Add game folders to the games directory."
            } else {
                "No games match the current filter"
            };
            frame.render_widget(Paragraph::new(message).block(block), area);
            return;
        };

        let mut lines = vec![Line::from(Span::styled(
            game.display_name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        lines.push(Line::from(Span::styled(
            game.identity.display().to_string(),
            Style::default().fg(self.theme.muted),
        )));
        lines.push(Line::from(format!(
            "Executable: {}",
            game.executable_path.display()
        )));
        lines.push(Line::from(format!("Size: {}", format_size(game.size_bytes))));
        if let Some(modified) = &game.last_modified {
            lines.push(Line::from(format!(
                "Modified: {}",
                modified.format("%Y-%m-%d %H:%M UTC")
            )));
        }
        lines.push(Line::from(format!("Category: {}", game.category)));
        if !game.tags.is_empty() {
            let tags = game.tags.iter().cloned().collect::<Vec<_>>().join(", ");
            lines.push(Line::from(format!("Tags: {tags}")));
        }
        lines.push(Line::from(format!(
            "Favorite: {}",
            if game.favorite { "yes" } else { "no" }
        )));
        lines.push(Line::from(format!("Play count: {}", game.play_count)));
        let last_played = format_last_played(game.last_played_at, Utc::now());
        lines.push(Line::from(format!("Last played: {last_played}")));

        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let primary = if self.state.mode == Mode::Filter {
            format!("Filter: {}", self.state.filter)
        } else {
            self.state.status.clone()
        };
        let root = self
            .root
            .as_ref()
            .map(|root| root.display().to_string())
            .unwrap_or_else(|| "not set".to_string());
        let live = if self.state.live_updates {
            Span::raw("live updates on")
        } else {
            Span::styled("live updates off", Style::default().fg(self.theme.warning))
        };
        let secondary = Line::from(vec![
            Span::styled(
                format!(
                    "{root} • sort: {} • category: {}{} • ",
                    self.state.sort.label(),
                    self.state.category.as_deref().unwrap_or("all"),
                    if self.state.favorites_only {
                        " • favorites"
                    } else {
                        ""
                    }
                ),
                Style::default().fg(self.theme.muted),
            ),
            live,
        ]);
        let help = Line::from(Span::styled(
            "enter launch · / filter · s sort · c category · f favorite · F favorites · r rescan · q quit",
            Style::default().fg(self.theme.muted),
        ));
        let paragraph = Paragraph::new(vec![Line::from(primary), secondary, help])
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    all_games: Vec<GameRecord>,
    filtered: Vec<GameRecord>,
    cursor: usize,
    offset: usize,
    list_height: usize,
    filter: String,
    sort: SortKey,
    category: Option<String>,
    favorites_only: bool,
    live_updates: bool,
    loaded: bool,
    status: String,
    mode: Mode,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            all_games: Vec::new(),
            filtered: Vec::new(),
            cursor: 0,
            offset: 0,
            list_height: 1,
            filter: String::new(),
            sort: SortKey::default(),
            category: None,
            favorites_only: false,
            live_updates: true,
            loaded: false,
            status: "Scanning games directory…".to_string(),
            mode: Mode::Browse,
            should_quit: false,
        }
    }
}

impl UiState {
    /// Replace the game list, keeping the selected game under the cursor when it survives.
    fn set_games(&mut self, games: Vec<GameRecord>) {
        let selected = self
            .current_game()
            .map(|game| game.executable_path.clone());
        self.all_games = games;
        self.loaded = true;
        if let Some(category) = &self.category {
            if !self.all_games.iter().any(|game| &game.category == category) {
                self.category = None;
            }
        }
        self.refilter();
        if let Some(path) = selected {
            if let Some(pos) = self
                .filtered
                .iter()
                .position(|game| game.executable_path == path)
            {
                self.cursor = pos;
            }
        }
        self.clamp_cursor();
        self.ensure_cursor_visible();
    }

    fn apply_filter(&mut self) {
        self.refilter();
        self.cursor = 0;
        self.offset = 0;
    }

    fn refilter(&mut self) {
        let matching = filter_games(
            &self.all_games,
            &self.filter,
            self.category.as_deref(),
            self.favorites_only,
        );
        self.filtered = sort_games(&matching, self.sort);
    }

    fn cycle_category(&mut self) {
        let categories = unique_categories(&self.all_games);
        self.category = match &self.category {
            None => categories.first().cloned(),
            Some(current) => categories
                .iter()
                .position(|category| category == current)
                .and_then(|pos| categories.get(pos + 1))
                .cloned(),
        };
        self.apply_filter();
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.filtered.is_empty() {
            return;
        }
        let len = self.filtered.len() as isize;
        let idx = (self.cursor as isize + delta).clamp(0, len - 1);
        self.cursor = idx as usize;
        self.ensure_cursor_visible();
    }

    fn move_to(&mut self, index: usize) {
        if self.filtered.is_empty() {
            return;
        }
        self.cursor = index.min(self.filtered.len() - 1);
        self.ensure_cursor_visible();
    }

    fn move_to_end(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        self.cursor = self.filtered.len() - 1;
        self.ensure_cursor_visible();
    }

    fn page_down(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(self.filtered.len());
        self.move_cursor(delta as isize);
    }

    fn page_up(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            return;
        }
        let delta = self.list_height.min(self.filtered.len());
        self.move_cursor(-(delta as isize));
    }

    fn visible_games(&self, height: usize) -> &[GameRecord] {
        if self.filtered.is_empty() {
            return &[];
        }
        let end = (self.offset + height).min(self.filtered.len());
        &self.filtered[self.offset..end]
    }

    fn current_game(&self) -> Option<&GameRecord> {
        self.filtered.get(self.cursor)
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn clamp_cursor(&mut self) {
        if self.filtered.is_empty() {
            self.cursor = 0;
            self.offset = 0;
        } else if self.cursor >= self.filtered.len() {
            self.cursor = self.filtered.len() - 1;
        }
    }

    fn ensure_cursor_visible(&mut self) {
        if self.filtered.is_empty() || self.list_height == 0 {
            self.offset = 0;
            return;
        }
        let height = self.list_height;
        let max_offset = self.filtered.len().saturating_sub(height);

        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + height {
            self.offset = self.cursor + 1 - height;
        }

        if self.offset > max_offset {
            self.offset = max_offset;
        }
    }
}
