/// PlayerCore: single owner of every piece of mutable player state.
///
/// The app loop calls into PlayerCore for each key and each tick; nothing
/// else touches the catalog, the view, the engine process or its socket.
///
/// A tick runs in a fixed order:
///   1. reap the engine; if a track ended, apply the auto-advance policy
///   2. ask the engine for position and duration (only while audio runs)
///
/// The app persists the session after every tick and every handled key.
use std::path::PathBuf;
use std::time::Duration;

use player_proto::catalog::{Catalog, PlaylistId, TrackIndex};
use player_proto::config::{Config, ControlsConfig};
use player_proto::playback::{auto_advance, LoopMode, PlaybackState};
use player_proto::protocol::{EngineCommand, DURATION, TIME_POS};
use player_proto::session::{SessionRecord, SessionStore};
use player_proto::shuffle::ShuffleSequencer;
use player_proto::view::TrackView;
use tracing::{debug, info, warn};

use crate::mpv::{ControlChannel, EnginePhase, EngineSupervisor};

/// Retry interval while waiting for a fresh engine's control socket.
const SOCKET_POLL: Duration = Duration::from_millis(50);

pub struct PlayerCore {
    catalog: Catalog,
    view: TrackView,
    playback: PlaybackState,
    shuffler: ShuffleSequencer,
    supervisor: EngineSupervisor,
    channel: ControlChannel,
    store: SessionStore,
    playlists_dir: PathBuf,
    controls: ControlsConfig,
    settle: Duration,
    socket_wait: Duration,
}

impl PlayerCore {
    pub fn new(catalog: Catalog, config: &Config, playlists_dir: PathBuf, session_path: PathBuf) -> Self {
        let view = TrackView::new(&catalog);
        let socket = config.engine.socket_path.clone();
        Self {
            catalog,
            view,
            playback: PlaybackState::new(config.engine.default_volume),
            shuffler: ShuffleSequencer::new(),
            supervisor: EngineSupervisor::new(config.engine.binary.clone(), socket.clone()),
            channel: ControlChannel::new(socket),
            store: SessionStore::new(session_path),
            playlists_dir,
            controls: config.controls.clone(),
            settle: Duration::from_millis(config.engine.settle_ms),
            socket_wait: Duration::from_millis(config.engine.socket_wait_ms),
        }
    }

    // ── read side (rendering) ─────────────────────────────────────────────────

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn view(&self) -> &TrackView {
        &self.view
    }

    /// Cursor and scroll changes only; membership changes go through
    /// `set_filter` / `set_playlist` so shuffle history stays in step.
    pub fn view_mut(&mut self) -> &mut TrackView {
        &mut self.view
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn engine_phase(&self) -> EnginePhase {
        self.supervisor.phase()
    }

    pub fn playlist_name(&self) -> Option<&str> {
        self.view
            .playlist()
            .and_then(|id| self.catalog.playlist_name(id))
    }

    pub fn store_path(&self) -> &std::path::Path {
        self.store.path()
    }

    // ── tick ──────────────────────────────────────────────────────────────────

    pub async fn tick(&mut self) {
        self.check_engine().await;
        self.refresh_timeline().await;
    }

    /// Reap the engine. An observed exit runs the auto-advance policy once
    /// and returns the track that was started in response.
    pub async fn check_engine(&mut self) -> Option<TrackIndex> {
        let finished = self.supervisor.poll_exit()?;
        debug!("core: track {} ended", finished);
        self.channel.disconnect();
        self.playback.clear_track();

        let next = auto_advance(
            finished,
            &self.playback,
            self.view.current_view(),
            &mut self.shuffler,
        )?;
        self.start_track(next).await;
        Some(next)
    }

    /// Poll position and duration. Skipped while paused or idle.
    pub async fn refresh_timeline(&mut self) {
        if !self.playback.wants_timeline() || !self.supervisor.is_running() {
            return;
        }
        match self.channel.query_pair(TIME_POS, DURATION).await {
            Ok((position, duration)) => self.playback.apply_timeline(position, duration),
            Err(e) => debug!("core: timeline refresh skipped: {}", e),
        }
    }

    // ── transport ─────────────────────────────────────────────────────────────

    pub async fn start_track(&mut self, track: TrackIndex) {
        let Some(path) = self.catalog.track_path(track) else {
            warn!("core: no track {}", track);
            return;
        };
        self.channel.disconnect();
        if let Err(e) = self.supervisor.start(track, &path, self.playback.volume).await {
            warn!("core: {}", e);
        }
        self.playback.started(track);
        info!(
            "core: playing {} (volume {})",
            self.catalog.name(track).unwrap_or("?"),
            self.playback.volume
        );
    }

    /// Play the track under the cursor. With shuffle on it counts as played.
    pub async fn play_cursor(&mut self) {
        let Some(track) = self.view.cursor_track() else {
            return;
        };
        self.start_track(track).await;
        if self.playback.shuffle() {
            self.shuffler.mark_played(track, self.view.current_view());
        }
    }

    /// Pause or resume a running engine; with nothing running, play the cursor.
    pub async fn toggle_pause(&mut self) {
        if !self.supervisor.is_running() || self.playback.playing.is_none() {
            self.play_cursor().await;
            return;
        }
        if self.send(EngineCommand::CyclePause).await {
            self.playback.paused = !self.playback.paused;
        }
    }

    pub async fn seek(&mut self, forward: bool) {
        if !self.supervisor.is_running() {
            return;
        }
        let step = self.controls.seek_step_secs;
        self.send(EngineCommand::SeekRelative(if forward { step } else { -step }))
            .await;
    }

    /// Adjust the tracked volume; a running engine gets the applied delta.
    pub async fn change_volume(&mut self, up: bool) {
        let step = i32::from(self.controls.volume_step);
        let applied = self.playback.adjust_volume(if up { step } else { -step });
        if applied != 0 && self.supervisor.is_running() {
            self.send(EngineCommand::AddVolume(applied)).await;
        }
    }

    pub async fn stop(&mut self) {
        self.channel.disconnect();
        if self.supervisor.stop().await {
            info!("core: stopped");
        }
        self.playback.clear_track();
    }

    async fn send(&mut self, command: EngineCommand) -> bool {
        match self.channel.send(&command).await {
            Ok(()) => true,
            Err(e) => {
                warn!("core: {:?} dropped: {}", command, e);
                false
            }
        }
    }

    // ── modes ─────────────────────────────────────────────────────────────────

    pub fn toggle_loop_mode(&mut self) -> LoopMode {
        self.playback.toggle_loop_mode()
    }

    /// Turning shuffle on starts a new cycle with the current track counted.
    pub fn toggle_shuffle(&mut self) -> bool {
        let on = !self.playback.shuffle();
        self.playback.set_shuffle(on);
        if on {
            self.shuffler.reset();
            if let Some(track) = self.playback.playing {
                self.shuffler.mark_played(track, self.view.current_view());
            }
        }
        on
    }

    // ── view membership ───────────────────────────────────────────────────────

    /// Returns false (and changes nothing) for a pattern that does not compile.
    pub fn set_filter(&mut self, text: &str) -> bool {
        let before = self.view.current_view().to_vec();
        match self.view.set_filter(text, &self.catalog) {
            Ok(()) => {
                self.view_changed(&before);
                true
            }
            Err(e) => {
                debug!("core: {}", e);
                false
            }
        }
    }

    pub fn clear_filter(&mut self) {
        let before = self.view.current_view().to_vec();
        self.view.clear_filter(&self.catalog);
        self.view_changed(&before);
    }

    pub fn set_playlist(&mut self, playlist: Option<PlaylistId>) {
        let before = self.view.current_view().to_vec();
        self.view.set_playlist(playlist, &self.catalog);
        self.view_changed(&before);
    }

    /// none → first → … → last → none
    pub fn cycle_playlist(&mut self) {
        let count = self.catalog.playlist_count();
        let next = match self.view.playlist() {
            None if count > 0 => Some(0),
            Some(id) if id + 1 < count => Some(id + 1),
            _ => None,
        };
        self.set_playlist(next);
    }

    pub fn reload_playlists(&mut self) {
        let before = self.view.current_view().to_vec();
        self.catalog.reload_playlists(&self.playlists_dir);
        self.view.refresh(&self.catalog);
        self.view_changed(&before);
        info!("core: {} playlist(s) reloaded", self.catalog.playlist_count());
    }

    /// A shuffle round belongs to one view: it restarts when the tracks in
    /// view differ from `before`.
    fn view_changed(&mut self, before: &[TrackIndex]) {
        if self.view.current_view() != before {
            debug!("core: view now {} track(s), shuffle round restarts", self.view.len());
            self.shuffler.reset();
        }
    }

    pub fn jump_to_playing(&mut self) -> bool {
        match self.playback.playing {
            Some(track) => self.view.jump_to_track(track),
            None => false,
        }
    }

    // ── session ───────────────────────────────────────────────────────────────

    pub fn persist(&mut self) {
        let record = SessionRecord::capture(&self.catalog, &self.view, &self.playback);
        if let Err(e) = self.store.save(&record) {
            warn!("core: session save failed: {}", e);
        }
    }

    pub fn load_session(&self) -> SessionRecord {
        self.store.load()
    }

    /// Reapply a saved session: modes and volume, then the playlist, then the
    /// cursor, then the track, then (once the engine answers) position and pause.
    pub async fn restore(&mut self, record: &SessionRecord) {
        let plan = record.plan(&self.catalog);

        if let Some(volume) = plan.volume {
            self.playback.volume = volume;
        }
        if let Some(mode) = plan.loop_mode {
            self.playback.set_loop_mode(mode);
        }
        if let Some(shuffle) = plan.shuffle {
            self.playback.set_shuffle(shuffle);
        }
        if plan.playlist.is_some() {
            self.set_playlist(plan.playlist);
        }
        if let Some(track) = plan.cursor_track {
            self.view.jump_to_track(track);
        }

        let Some(resume) = plan.resume else {
            return;
        };
        info!(
            "core: resuming {} at {:.1}s{}",
            self.catalog.name(resume.track).unwrap_or("?"),
            resume.position,
            if resume.paused { " (paused)" } else { "" }
        );
        self.start_track(resume.track).await;
        if self.playback.shuffle() {
            self.shuffler.mark_played(resume.track, self.view.current_view());
        }
        if !self.wait_for_engine().await {
            warn!("core: engine socket never came up, not seeking");
            return;
        }
        tokio::time::sleep(self.settle).await;

        if resume.position > 0.0 {
            self.send(EngineCommand::SeekAbsolute(resume.position)).await;
            self.playback.position_secs = resume.position;
        }
        if resume.paused && self.send(EngineCommand::CyclePause).await {
            self.playback.paused = true;
        }
    }

    /// Wait (bounded) for a freshly started engine to accept connections.
    async fn wait_for_engine(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + self.socket_wait;
        loop {
            if !self.supervisor.is_running() {
                return false;
            }
            if self.channel.connect().await.is_ok() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SOCKET_POLL).await;
        }
    }

    /// Persist, then take the engine down and remove its socket.
    pub async fn shutdown(&mut self) {
        self.persist();
        self.stop().await;
        info!("core: shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    fn catalog(names: &[&str]) -> Catalog {
        Catalog::new("/music", names.iter().map(|s| s.to_string()).collect())
    }

    fn config(dir: &Path, binary: impl Into<PathBuf>) -> Config {
        let mut config = Config::default();
        config.engine.binary = binary.into();
        config.engine.socket_path = dir.join("engine.sock");
        config.engine.settle_ms = 10;
        config
    }

    fn core_with(dir: &Path, names: &[&str], binary: impl Into<PathBuf>) -> PlayerCore {
        let config = config(dir, binary);
        PlayerCore::new(
            catalog(names),
            &config,
            dir.join("playlists"),
            dir.join("session"),
        )
    }

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("engine");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Tick until the engine exit has been handled.
    async fn next_started(core: &mut PlayerCore) -> Option<TrackIndex> {
        for _ in 0..300 {
            if let Some(t) = core.check_engine().await {
                return Some(t);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_auto_advance_wraps_through_catalog() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a.mp3", "b.mp3", "c.mp3"], "true");

        core.start_track(0).await;
        assert_eq!(core.playback().playing, Some(0));
        assert_eq!(next_started(&mut core).await, Some(1));
        assert_eq!(next_started(&mut core).await, Some(2));
        assert_eq!(next_started(&mut core).await, Some(0));
        core.stop().await;
    }

    #[tokio::test]
    async fn test_single_loop_restarts_same_track() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a.mp3", "b.mp3", "c.mp3"], "true");
        core.toggle_loop_mode();
        core.start_track(1).await;
        for _ in 0..3 {
            assert_eq!(next_started(&mut core).await, Some(1));
        }
        core.stop().await;
    }

    #[tokio::test]
    async fn test_shuffle_plays_each_track_once_per_cycle() {
        let dir = TempDir::new().unwrap();
        let names = ["a", "b", "c", "d", "e"];
        let mut core = core_with(dir.path(), &names, "true");
        core.shuffler = ShuffleSequencer::with_seed(9);
        assert!(core.toggle_shuffle());

        core.play_cursor().await;
        let mut seen: HashSet<TrackIndex> = [0].into();
        for _ in 1..names.len() {
            let t = next_started(&mut core).await.unwrap();
            assert!(seen.insert(t), "track {t} replayed inside a cycle");
        }
        assert_eq!(seen.len(), names.len());
        core.stop().await;
    }

    #[tokio::test]
    async fn test_missing_engine_skips_to_next_track() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a", "b"], dir.path().join("no-engine"));
        core.start_track(0).await;
        assert_eq!(core.engine_phase(), EnginePhase::Failed);
        assert_eq!(core.check_engine().await, Some(1));
        // one exit, one advance
        assert_eq!(core.engine_phase(), EnginePhase::Failed);
        assert_eq!(core.playback().playing, Some(1));
    }

    #[tokio::test]
    async fn test_stop_does_not_advance() {
        let dir = TempDir::new().unwrap();
        let engine = script(dir.path(), "exec sleep 30");
        let mut core = core_with(dir.path(), &["a", "b"], engine);
        core.start_track(0).await;
        core.stop().await;
        assert_eq!(core.playback().playing, None);
        assert_eq!(core.check_engine().await, None);
        assert_eq!(core.engine_phase(), EnginePhase::Idle);
    }

    #[tokio::test]
    async fn test_volume_carries_into_next_start() {
        let dir = TempDir::new().unwrap();
        let args = dir.path().join("args");
        let engine = script(dir.path(), &format!("echo \"$@\" > '{}'", args.display()));
        let mut core = core_with(dir.path(), &["a.mp3"], engine);

        core.change_volume(false).await;
        core.change_volume(false).await;
        assert_eq!(core.playback().volume, 90);

        core.start_track(0).await;
        let mut written = String::new();
        for _ in 0..200 {
            written = std::fs::read_to_string(&args).unwrap_or_default();
            if written.contains("--volume") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(written.contains("--volume=90"), "args were {written:?}");
        assert!(written.trim_end().ends_with("/music/a.mp3"));
        core.stop().await;
    }

    #[tokio::test]
    async fn test_view_change_clears_shuffle_history() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a", "b", "c"], dir.path().join("no-engine"));
        core.toggle_shuffle();
        core.play_cursor().await;
        assert!(!core.shuffler.history().is_empty());

        assert!(core.set_filter("[ab]"));
        assert!(core.shuffler.history().is_empty());

        core.shuffler.mark_played(0, core.view.current_view());
        assert!(!core.set_filter("(bad"));
        assert!(!core.shuffler.history().is_empty());
        assert_eq!(core.view().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_view_keeps_shuffle_history() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a", "b", "c", "d"], dir.path().join("no-engine"));
        core.toggle_shuffle();
        core.play_cursor().await;
        assert_eq!(core.shuffler.history().len(), 1);

        // no filter to clear, same playlist, a filter matching everything
        core.clear_filter();
        core.set_playlist(None);
        assert!(core.set_filter("."));
        core.reload_playlists();
        assert_eq!(core.view().len(), 4);
        assert_eq!(core.shuffler.history().len(), 1);

        assert!(core.set_filter("[abc]"));
        assert!(core.shuffler.history().is_empty());
    }

    #[test]
    fn test_cycle_playlist_wraps_to_none() {
        let dir = TempDir::new().unwrap();
        let mut core = core_with(dir.path(), &["a", "b", "c"], "true");
        core.catalog.insert_playlist("one", vec![2]);
        core.catalog.insert_playlist("two", vec![0, 1]);

        core.cycle_playlist();
        assert_eq!(core.playlist_name(), Some("one"));
        assert_eq!(core.view().current_view(), &[2]);
        core.cycle_playlist();
        assert_eq!(core.playlist_name(), Some("two"));
        core.cycle_playlist();
        assert_eq!(core.playlist_name(), None);
        assert_eq!(core.view().len(), 3);
    }

    #[test]
    fn test_reload_playlists_keeps_cursor_track() {
        let dir = TempDir::new().unwrap();
        let pl_dir = dir.path().join("playlists");
        std::fs::create_dir_all(&pl_dir).unwrap();
        std::fs::write(pl_dir.join("mix"), "c\na\n").unwrap();

        let mut core = core_with(dir.path(), &["a", "b", "c"], "true");
        core.reload_playlists();
        core.set_playlist(Some(0));
        core.view_mut().jump_to_track(0);

        std::fs::write(pl_dir.join("mix"), "b\na\nc\n").unwrap();
        core.reload_playlists();
        assert_eq!(core.view().current_view(), &[1, 0, 2]);
        assert_eq!(core.view().cursor_track(), Some(0));
    }

    #[tokio::test]
    async fn test_session_roundtrip_through_store() {
        let dir = TempDir::new().unwrap();
        let names = ["a", "b", "c", "d"];
        let mut core = core_with(dir.path(), &names, "true");
        core.catalog.insert_playlist("mix", vec![3, 1, 2]);
        core.set_playlist(Some(0));
        core.view_mut().jump_to_track(2);
        core.change_volume(false).await;
        core.toggle_shuffle();
        core.persist();

        let mut fresh = core_with(dir.path(), &names, "true");
        fresh.catalog.insert_playlist("mix", vec![3, 1, 2]);
        let record = fresh.load_session();
        fresh.restore(&record).await;

        assert_eq!(fresh.playback().volume, 95);
        assert!(fresh.playback().shuffle());
        assert_eq!(fresh.playback().loop_mode(), LoopMode::All);
        assert_eq!(fresh.playlist_name(), Some("mix"));
        assert_eq!(fresh.view().cursor_track(), Some(2));
        assert_eq!(fresh.playback().playing, None);
    }

    #[tokio::test]
    async fn test_restore_resumes_with_seek_then_pause() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let engine = script(
            dir.path(),
            &format!("touch '{}'\nexec sleep 30", marker.display()),
        );
        let sock = dir.path().join("engine.sock");

        // Fake engine socket: appears once the process has started.
        let server_sock = sock.clone();
        let server = tokio::spawn(async move {
            while !marker.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let listener = UnixListener::bind(&server_sock).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            let mut got = Vec::new();
            while got.len() < 2 {
                let line = lines.next_line().await.unwrap().unwrap();
                let v: serde_json::Value = serde_json::from_str(&line).unwrap();
                got.push(v["command"].clone());
            }
            got
        });

        let mut core = core_with(dir.path(), &["a.mp3", "b.mp3"], engine);
        let record = SessionRecord::parse("track=b.mp3\nposition=42.5\npaused=1\nvolume=70\n");
        core.restore(&record).await;

        let commands = server.await.unwrap();
        assert_eq!(commands[0], serde_json::json!(["seek", 42.5, "absolute"]));
        assert_eq!(commands[1], serde_json::json!(["cycle", "pause"]));
        assert_eq!(core.playback().playing, Some(1));
        assert!(core.playback().paused);
        assert_eq!(core.playback().volume, 70);
        core.shutdown().await;
        assert!(!sock.exists());
    }
}
