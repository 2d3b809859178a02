//! Playback state and the auto-advance policy run when a track ends.

use serde::{Deserialize, Serialize};

use crate::catalog::TrackIndex;
use crate::shuffle::ShuffleSequencer;

pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    All,
    Single,
}

impl LoopMode {
    pub fn label(self) -> &'static str {
        match self {
            LoopMode::All => "all",
            LoopMode::Single => "single",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "all" => Some(LoopMode::All),
            "single" => Some(LoopMode::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub playing: Option<TrackIndex>,
    pub paused: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub volume: u8,
    loop_mode: LoopMode,
    shuffle: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(MAX_VOLUME)
    }
}

impl PlaybackState {
    pub fn new(volume: u8) -> Self {
        Self {
            playing: None,
            paused: false,
            position_secs: 0.0,
            duration_secs: 0.0,
            volume: volume.min(MAX_VOLUME),
            loop_mode: LoopMode::All,
            shuffle: false,
        }
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Single repeat and shuffle exclude each other.
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        if mode == LoopMode::Single {
            self.shuffle = false;
        }
    }

    pub fn toggle_loop_mode(&mut self) -> LoopMode {
        let next = match self.loop_mode {
            LoopMode::All => LoopMode::Single,
            LoopMode::Single => LoopMode::All,
        };
        self.set_loop_mode(next);
        next
    }

    pub fn set_shuffle(&mut self, on: bool) {
        self.shuffle = on;
        if on {
            self.loop_mode = LoopMode::All;
        }
    }

    /// Apply a signed step, clamped to `0..=100`. Returns the applied delta.
    pub fn adjust_volume(&mut self, delta: i32) -> i32 {
        let before = i32::from(self.volume);
        let after = (before + delta).clamp(0, i32::from(MAX_VOLUME));
        // clamp above keeps this in u8 range
        self.volume = after as u8;
        after - before
    }

    /// Forget everything about the current track.
    pub fn clear_track(&mut self) {
        self.playing = None;
        self.paused = false;
        self.position_secs = 0.0;
        self.duration_secs = 0.0;
    }

    pub fn started(&mut self, track: TrackIndex) {
        self.clear_track();
        self.playing = Some(track);
    }

    /// Position and duration are only worth asking for while audio runs.
    pub fn wants_timeline(&self) -> bool {
        self.playing.is_some() && !self.paused
    }

    /// Take fresh values; an unknown value keeps the last known one.
    pub fn apply_timeline(&mut self, position: Option<f64>, duration: Option<f64>) {
        if let Some(p) = position {
            self.position_secs = p;
        }
        if let Some(d) = duration {
            self.duration_secs = d;
        }
    }

    /// Fraction of the track played, 0.0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Decide what follows `finished`.
///
/// Single repeat restarts the same track. Shuffle draws (and marks) the next
/// unplayed track of `view`. Otherwise the track after `finished` in `view`
/// plays, wrapping to the first; a finished track no longer in the view
/// hands over to the view's first entry. An empty view stops playback.
pub fn auto_advance(
    finished: TrackIndex,
    playback: &PlaybackState,
    view: &[TrackIndex],
    shuffler: &mut ShuffleSequencer,
) -> Option<TrackIndex> {
    if playback.loop_mode() == LoopMode::Single {
        return Some(finished);
    }
    if playback.shuffle() {
        let next = shuffler.next(view)?;
        shuffler.mark_played(next, view);
        return Some(next);
    }
    let first = *view.first()?;
    match view.iter().position(|&t| t == finished) {
        Some(pos) => Some(view.get(pos + 1).copied().unwrap_or(first)),
        None => Some(first),
    }
}
