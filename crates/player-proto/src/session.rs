//! Session persistence: a small `key=value` file that lets the next launch
//! pick up where this one stopped.
//!
//! ```text
//! volume=80
//! track=song.mp3
//! position=42.5
//! cursor=other.mp3
//! playlist=road
//! loop=all
//! shuffle=1
//! paused=0
//! ```
//!
//! Tracks and playlists are stored by name so the record survives catalog
//! reordering; names that no longer resolve are simply dropped on restore.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::catalog::{Catalog, PlaylistId, TrackIndex};
use crate::playback::{LoopMode, PlaybackState, MAX_VOLUME};
use crate::view::TrackView;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    pub volume: Option<u8>,
    pub track: Option<String>,
    pub position: Option<f64>,
    pub cursor: Option<String>,
    pub playlist: Option<String>,
    pub loop_mode: Option<LoopMode>,
    pub shuffle: Option<bool>,
    pub paused: Option<bool>,
}

impl SessionRecord {
    /// Snapshot the restorable part of the running state.
    pub fn capture(catalog: &Catalog, view: &TrackView, playback: &PlaybackState) -> Self {
        let track = playback
            .playing
            .and_then(|t| catalog.name(t))
            .map(str::to_string);
        let playing = track.is_some();
        Self {
            volume: Some(playback.volume),
            position: playing.then_some(playback.position_secs),
            paused: Some(playing && playback.paused),
            track,
            cursor: view
                .cursor_track()
                .and_then(|t| catalog.name(t))
                .map(str::to_string),
            playlist: view
                .playlist()
                .and_then(|id| catalog.playlist_name(id))
                .map(str::to_string),
            loop_mode: Some(playback.loop_mode()),
            shuffle: Some(playback.shuffle()),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut put = |key: &str, value: String| {
            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        };
        if let Some(v) = self.volume {
            put("volume", v.to_string());
        }
        if let Some(t) = &self.track {
            put("track", t.clone());
        }
        if let Some(p) = self.position {
            put("position", format!("{:.3}", p));
        }
        if let Some(c) = &self.cursor {
            put("cursor", c.clone());
        }
        if let Some(p) = &self.playlist {
            put("playlist", p.clone());
        }
        if let Some(m) = self.loop_mode {
            put("loop", m.label().to_string());
        }
        if let Some(s) = self.shuffle {
            put("shuffle", flag(s).to_string());
        }
        if let Some(p) = self.paused {
            put("paused", flag(p).to_string());
        }
        out
    }

    /// Lenient parse: unknown keys, malformed lines and bad values are skipped.
    pub fn parse(text: &str) -> Self {
        let mut rec = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim_end_matches('\r');
            match key.trim() {
                "volume" => rec.volume = value.trim().parse::<u8>().ok().map(|v| v.min(MAX_VOLUME)),
                "track" => rec.track = non_empty(value),
                "position" => {
                    rec.position = value
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|p| p.is_finite() && *p >= 0.0)
                }
                "cursor" => rec.cursor = non_empty(value),
                "playlist" => rec.playlist = non_empty(value),
                "loop" => rec.loop_mode = LoopMode::parse(value),
                "shuffle" => rec.shuffle = parse_flag(value),
                "paused" => rec.paused = parse_flag(value),
                other => debug!("session: ignoring key {:?}", other),
            }
        }
        rec
    }

    /// Resolve names against `catalog` into the steps a restore performs.
    pub fn plan(&self, catalog: &Catalog) -> RestorePlan {
        let playlist = self.playlist.as_deref().and_then(|n| catalog.playlist_id(n));
        let resume = self
            .track
            .as_deref()
            .and_then(|n| catalog.position(n))
            .map(|track| Resume {
                track,
                position: self.position.unwrap_or(0.0),
                paused: self.paused.unwrap_or(false),
            });
        RestorePlan {
            volume: self.volume,
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            playlist,
            cursor_track: self.cursor.as_deref().and_then(|n| catalog.position(n)),
            resume,
        }
    }
}

/// What a restore applies, in order: modes and volume, then the playlist,
/// then the cursor, then the resumed track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestorePlan {
    pub volume: Option<u8>,
    pub loop_mode: Option<LoopMode>,
    pub shuffle: Option<bool>,
    pub playlist: Option<PlaylistId>,
    pub cursor_track: Option<TrackIndex>,
    pub resume: Option<Resume>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resume {
    pub track: TrackIndex,
    pub position: f64,
    pub paused: bool,
}

fn flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// On-disk home of the session record.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    last_written: Option<String>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is an empty session.
    pub fn load(&self) -> SessionRecord {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => SessionRecord::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionRecord::default(),
            Err(e) => {
                warn!("session: cannot read {}: {}", self.path.display(), e);
                SessionRecord::default()
            }
        }
    }

    /// Write `record`, skipping the disk when it matches the last write.
    /// Returns whether the file was touched.
    pub fn save(&mut self, record: &SessionRecord) -> anyhow::Result<bool> {
        let text = record.to_text();
        if self.last_written.as_deref() == Some(text.as_str()) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &text)?;
        std::fs::rename(&tmp, &self.path)?;
        self.last_written = Some(text);
        Ok(true)
    }
}
