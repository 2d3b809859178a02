//! App: terminal front-end and event loop.
//!
//! Architecture:
//! - `App` owns the `PlayerCore` plus the little UI state that is not part of
//!   the player (input mode, search line).
//! - A blocking reader task forwards crossterm events over an mpsc channel.
//! - The loop draws a frame, then waits for input, the tick interval or a
//!   termination signal, handles it, and persists the session.
//! - Termination signals are registered in `main` before the session is
//!   resumed, so a signal at any point after an engine may exist is handled.
//! - Every way out of `run`, including a failed terminal setup, goes through
//!   the same teardown.

use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

use player_proto::catalog::TrackIndex;
use player_proto::session::SessionRecord;

use crate::{
    action::{self, Action},
    components::track_list,
    core::PlayerCore,
    widgets::{
        filter_input::{FilterAction, FilterInput},
        progress_bar,
        status_bar::{self, InputMode},
    },
};

/// How often the input reader checks whether the app is gone.
const INPUT_POLL: Duration = Duration::from_millis(100);

// ── Termination signals ───────────────────────────────────────────────────────

/// SIGINT, SIGTERM and SIGHUP as awaitable streams. Once registered the
/// default action (exit without cleanup) no longer applies.
pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl ShutdownSignals {
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Resolves with the name of the next signal received.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

/// Resume a saved session unless a termination signal arrives first. On a
/// signal the core is shut down and the signal's name returned.
pub async fn resume(
    core: &mut PlayerCore,
    record: &SessionRecord,
    signals: &mut ShutdownSignals,
) -> Option<&'static str> {
    let interrupted = tokio::select! {
        _ = core.restore(record) => None,
        name = signals.recv() => Some(name),
    };
    if let Some(name) = interrupted {
        info!("{} while resuming, shutting down", name);
        core.shutdown().await;
    }
    interrupted
}

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    /// The terminal stopped delivering input.
    InputClosed,
}

pub struct App {
    core: PlayerCore,
    signals: ShutdownSignals,
    search: FilterInput,
    mode: InputMode,
    /// Cursor track when search began; Esc returns there.
    search_origin: Option<TrackIndex>,
    should_quit: bool,
    tmux: bool,
    tick: Duration,
}

impl App {
    pub fn new(core: PlayerCore, signals: ShutdownSignals, tmux: bool, tick_ms: u64) -> Self {
        Self {
            core,
            signals,
            search: FilterInput::default(),
            mode: InputMode::Normal,
            search_origin: None,
            should_quit: false,
            tmux,
            tick: Duration::from_millis(tick_ms.max(10)),
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        if let Err(e) = enable_raw_mode() {
            self.core.shutdown().await;
            return Err(anyhow::anyhow!("cannot put the terminal in raw mode: {}", e));
        }
        let result = self.drive(io::stdout()).await;
        self.teardown(result).await
    }

    /// Terminal setup plus the event loop. Any error comes back to `run`
    /// with raw mode still on.
    async fn drive<W: io::Write>(&mut self, out: W) -> anyhow::Result<()> {
        let mut terminal = enter_terminal(out, self.tmux)?;
        debug!("run(): terminal ready, size={:?}", terminal.size());
        let result = self.event_loop(&mut terminal).await;
        terminal.show_cursor()?;
        result
    }

    async fn teardown(&mut self, result: anyhow::Result<()>) -> anyhow::Result<()> {
        if let Err(e) = &result {
            info!("leaving with error: {:#}", e);
        }
        self.core.shutdown().await;
        restore_terminal(self.tmux);
        result
    }

    async fn event_loop<W: io::Write>(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<W>>,
    ) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);

        // ── Background task: keyboard events ──────────────────────────────────
        tokio::task::spawn_blocking(move || loop {
            if tx.is_closed() {
                break;
            }
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.blocking_send(AppMessage::Event(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.blocking_send(AppMessage::InputClosed);
                        break;
                    }
                },
                Err(_) => {
                    let _ = tx.blocking_send(AppMessage::InputClosed);
                    break;
                }
            }
        });

        let mut tick = tokio::time::interval(self.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        loop {
            terminal.draw(|f| self.draw(f))?;
            if self.should_quit {
                break;
            }

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(AppMessage::Event(ev)) => self.handle_event(ev).await,
                    Some(AppMessage::InputClosed) | None => {
                        info!("input closed");
                        self.should_quit = true;
                    }
                },
                _ = tick.tick() => self.core.tick().await,
                name = self.signals.recv() => {
                    info!("{}", name);
                    self.should_quit = true;
                }
            }

            self.core.persist();
        }
        Ok(())
    }

    async fn handle_event(&mut self, ev: Event) {
        if let Event::Key(key) = ev {
            if key.kind == KeyEventKind::Press {
                self.handle_key(key).await;
            }
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        if self.mode == InputMode::Search {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                self.should_quit = true;
                return;
            }
            self.handle_search_key(key);
            return;
        }
        if let Some(action) = action::map_key(key) {
            self.dispatch(action).await;
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match self.search.handle_key(key) {
            FilterAction::Changed(text) => {
                if text.is_empty() {
                    self.core.clear_filter();
                } else if !self.core.set_filter(&text) {
                    debug!("search: incomplete pattern {:?}", text);
                }
            }
            FilterAction::Confirmed => {
                debug!("search: keeping {:?}", self.search.text());
                self.mode = InputMode::Normal;
            }
            FilterAction::Cancelled => {
                self.core.clear_filter();
                if let Some(track) = self.search_origin.take() {
                    self.core.view_mut().jump_to_track(track);
                }
                self.mode = InputMode::Normal;
            }
            FilterAction::None => {}
        }
    }

    async fn dispatch(&mut self, action: Action) {
        debug!("dispatch: {:?}", action);
        match action {
            Action::MoveCursor(delta) => self.core.view_mut().move_cursor(delta),
            Action::CursorFirst => self.core.view_mut().jump(0),
            Action::CursorLast => self.core.view_mut().jump_last(),
            Action::Scroll(delta) => self.core.view_mut().scroll(delta),
            Action::ScrollHalfPage(dir) => {
                let half = (self.core.view().list_rows() / 2).max(1) as isize;
                self.core.view_mut().scroll(dir * half);
            }
            Action::JumpToPlaying => {
                self.core.jump_to_playing();
            }
            Action::PlayCursor => self.core.play_cursor().await,
            Action::TogglePause => self.core.toggle_pause().await,
            Action::SeekBack => self.core.seek(false).await,
            Action::SeekForward => self.core.seek(true).await,
            Action::VolumeUp => self.core.change_volume(true).await,
            Action::VolumeDown => self.core.change_volume(false).await,
            Action::Stop => self.core.stop().await,
            Action::ToggleLoop => {
                self.core.toggle_loop_mode();
            }
            Action::ToggleShuffle => {
                self.core.toggle_shuffle();
            }
            Action::CyclePlaylist => self.core.cycle_playlist(),
            Action::ReloadPlaylists => self.core.reload_playlists(),
            Action::OpenSearch => {
                self.search_origin = self.core.view().cursor_track();
                self.core.clear_filter();
                self.search.activate();
                self.mode = InputMode::Search;
            }
            Action::Quit => self.should_quit = true,
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1), // separator
                Constraint::Min(1),    // track list
                Constraint::Length(1), // now playing / hints
                Constraint::Length(1), // progress / search line
            ])
            .split(frame.area());

        self.core.view_mut().set_list_rows(chunks[2].height as usize);

        track_list::draw_header(frame, chunks[0], &self.core);
        status_bar::draw_separator(frame, chunks[1]);
        track_list::draw_track_list(frame, chunks[2], &self.core);

        let playback = self.core.playback();
        match playback.playing {
            Some(track) => {
                let name = self.core.catalog().name(track).unwrap_or("?");
                let phase = self.core.engine_phase();
                status_bar::draw_now_playing(frame, chunks[3], playback, phase, name);
            }
            None => status_bar::draw_keys_bar(frame, chunks[3], self.mode, playback.volume),
        }

        if self.search.is_active() {
            self.search.draw(frame, chunks[4]);
        } else if playback.playing.is_some() {
            progress_bar::draw_progress(
                frame,
                chunks[4],
                playback.progress(),
                playback.position_secs,
                playback.duration_secs,
            );
        }
    }
}

fn enter_terminal<W: io::Write>(
    mut out: W,
    tmux: bool,
) -> anyhow::Result<Terminal<CrosstermBackend<W>>> {
    if !tmux {
        execute!(out, EnterAlternateScreen)?;
    }
    let mut terminal = Terminal::new(CrosstermBackend::new(out))?;
    terminal.clear()?;
    Ok(terminal)
}

/// Leave raw mode and the alternate screen. Safe to call more than once.
pub fn restore_terminal(tmux: bool) {
    let _ = disable_raw_mode();
    if !tmux {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use nix::sys::signal::{kill, raise, Signal as Sig};
    use nix::unistd::Pid;
    use player_proto::catalog::Catalog;
    use player_proto::config::Config;
    use tempfile::TempDir;

    fn player_core(dir: &Path, engine: PathBuf) -> PlayerCore {
        let mut config = Config::default();
        config.engine.binary = engine;
        config.engine.socket_path = dir.join("engine.sock");
        config.engine.socket_wait_ms = 5_000;
        let names = ["alpha.mp3", "bravo.ogg", "charlie.mp3", "delta.ogg"];
        let catalog = Catalog::new("/music", names.iter().map(|s| s.to_string()).collect());
        PlayerCore::new(catalog, &config, dir.join("playlists"), dir.join("session"))
    }

    fn app(dir: &TempDir) -> App {
        let core = player_core(dir.path(), dir.path().join("no-engine"));
        let signals = ShutdownSignals::register().unwrap();
        App::new(core, signals, true, 250)
    }

    /// Engine that records its pid, then idles without opening a socket.
    fn idle_engine(dir: &Path) -> (PathBuf, PathBuf) {
        let pid_file = dir.join("engine.pid");
        let path = dir.join("engine");
        let body = format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display());
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (path, pid_file)
    }

    async fn read_pid(pid_file: &Path) -> Pid {
        for _ in 0..300 {
            if let Ok(text) = std::fs::read_to_string(pid_file) {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    return Pid::from_raw(pid);
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never wrote {}", pid_file.display());
    }

    struct ClosedOutput;

    impl io::Write for ClosedOutput {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            app.handle_key(key(KeyCode::Char(c))).await;
        }
    }

    #[tokio::test]
    async fn test_search_enter_keeps_filter() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Char('/'))).await;
        assert_eq!(app.mode, InputMode::Search);

        type_str(&mut app, "ogg").await;
        assert_eq!(app.core.view().current_view(), &[1, 3]);
        app.handle_key(key(KeyCode::Enter)).await;
        assert_eq!(app.mode, InputMode::Normal);
        assert_eq!(app.core.view().len(), 2);

        // j in normal mode moves, it is not typed
        app.handle_key(key(KeyCode::Char('j'))).await;
        assert_eq!(app.core.view().cursor_track(), Some(3));
    }

    #[tokio::test]
    async fn test_search_esc_restores_cursor() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Char('j'))).await;
        app.handle_key(key(KeyCode::Char('j'))).await;
        assert_eq!(app.core.view().cursor_track(), Some(2));

        app.handle_key(key(KeyCode::Char('?'))).await;
        type_str(&mut app, "^d").await;
        assert_eq!(app.core.view().cursor_track(), Some(3));
        app.handle_key(key(KeyCode::Esc)).await;

        assert_eq!(app.mode, InputMode::Normal);
        assert!(!app.core.view().filter_active());
        assert_eq!(app.core.view().len(), 4);
        assert_eq!(app.core.view().cursor_track(), Some(2));
    }

    #[tokio::test]
    async fn test_search_tolerates_partial_regex() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Char('/'))).await;
        type_str(&mut app, "(al").await;
        // "(" and "(a" / "(al" do not compile; nothing was filtered
        assert_eq!(app.core.view().len(), 4);
        type_str(&mut app, ")").await;
        assert_eq!(app.core.view().current_view(), &[0]);
        app.handle_key(key(KeyCode::Backspace)).await;
        assert_eq!(app.core.view().current_view(), &[0]);
    }

    #[tokio::test]
    async fn test_opening_search_clears_previous_filter() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Char('/'))).await;
        type_str(&mut app, "ogg").await;
        app.handle_key(key(KeyCode::Enter)).await;

        app.handle_key(key(KeyCode::Char('/'))).await;
        assert_eq!(app.core.view().len(), 4);
        assert_eq!(app.search.text(), "");
    }

    #[tokio::test]
    async fn test_half_page_scroll_uses_list_rows() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.core.view_mut().set_list_rows(2);
        app.dispatch(Action::ScrollHalfPage(1)).await;
        assert_eq!(app.core.view().scroll_offset(), 1);
        assert_eq!(app.core.view().cursor(), 1);
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.handle_key(key(KeyCode::Char('/'))).await;
        app.handle_key(key(KeyCode::Char('q'))).await;
        assert!(!app.should_quit, "q is text while searching");
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .await;
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_signal_while_resuming_stops_engine() {
        let dir = TempDir::new().unwrap();
        let (engine, pid_file) = idle_engine(dir.path());
        let mut core = player_core(dir.path(), engine);
        let mut signals = ShutdownSignals::register().unwrap();
        let record = SessionRecord::parse("track=bravo.ogg\nposition=30\n");

        let pid_watch = pid_file.clone();
        tokio::spawn(async move {
            // the engine is up and restore is waiting for its socket
            read_pid(&pid_watch).await;
            raise(Sig::SIGHUP).unwrap();
        });

        let interrupted = resume(&mut core, &record, &mut signals).await;
        assert_eq!(interrupted, Some("SIGHUP"));
        assert_eq!(core.engine_phase(), crate::mpv::EnginePhase::Idle);
        assert_eq!(core.playback().playing, None);

        let pid = read_pid(&pid_file).await;
        assert!(kill(pid, None).is_err(), "engine {pid} outlived the controller");
        assert!(!dir.path().join("engine.sock").exists());
    }

    #[tokio::test]
    async fn test_failed_terminal_setup_still_tears_down() {
        let dir = TempDir::new().unwrap();
        let (engine, pid_file) = idle_engine(dir.path());
        let mut app = App::new(
            player_core(dir.path(), engine),
            ShutdownSignals::register().unwrap(),
            true,
            250,
        );
        app.core.start_track(0).await;
        let pid = read_pid(&pid_file).await;

        let result = app.drive(ClosedOutput).await;
        assert!(result.is_err());
        assert!(app.teardown(result).await.is_err());

        assert_eq!(app.core.playback().playing, None);
        assert!(kill(pid, None).is_err(), "engine {pid} left running");
        assert!(dir.path().join("session").exists());
    }
}
