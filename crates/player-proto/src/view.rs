//! TrackView: the visible, possibly playlist-scoped and filtered, slice of
//! the catalog together with cursor and scroll-window arithmetic.
//!
//! Sources stack in a fixed order: the active playlist narrows the catalog,
//! then the filter narrows the playlist. Whenever the membership changes the
//! cursor follows the track it was on, or falls back to the first row.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::catalog::{Catalog, PlaylistId, TrackIndex};

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TrackView {
    entries: Vec<TrackIndex>,
    filter_text: String,
    filter: Option<Regex>,
    playlist: Option<PlaylistId>,
    cursor: usize,
    scroll_offset: usize,
    list_rows: usize,
}

impl TrackView {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            entries: (0..catalog.len()).collect(),
            filter_text: String::new(),
            filter: None,
            playlist: None,
            cursor: 0,
            scroll_offset: 0,
            list_rows: 1,
        }
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    pub fn current_view(&self) -> &[TrackIndex] {
        &self.entries
    }

    pub fn index_at(&self, pos: usize) -> Option<TrackIndex> {
        self.entries.get(pos).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position_of(&self, track: TrackIndex) -> Option<usize> {
        self.entries.iter().position(|&t| t == track)
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn filter_active(&self) -> bool {
        self.filter.is_some()
    }

    pub fn playlist(&self) -> Option<PlaylistId> {
        self.playlist
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_track(&self) -> Option<TrackIndex> {
        self.index_at(self.cursor)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn list_rows(&self) -> usize {
        self.list_rows
    }

    /// Entries inside `[scroll_offset, scroll_offset + list_rows)`.
    pub fn visible_window(&self) -> &[TrackIndex] {
        let start = self.scroll_offset.min(self.entries.len());
        let end = (start + self.list_rows).min(self.entries.len());
        &self.entries[start..end]
    }

    // ── Membership ────────────────────────────────────────────────────────────

    /// Apply a case-insensitive regex filter. Empty text removes the filter.
    /// A pattern that does not compile leaves everything as it was.
    pub fn set_filter(&mut self, text: &str, catalog: &Catalog) -> Result<(), ViewError> {
        if text.is_empty() {
            self.clear_filter(catalog);
            return Ok(());
        }
        let re = RegexBuilder::new(text)
            .case_insensitive(true)
            .build()
            .map_err(|source| ViewError::InvalidPattern {
                pattern: text.to_string(),
                source,
            })?;
        self.filter_text = text.to_string();
        self.filter = Some(re);
        self.rebuild(catalog);
        Ok(())
    }

    pub fn clear_filter(&mut self, catalog: &Catalog) {
        self.filter_text.clear();
        self.filter = None;
        self.rebuild(catalog);
    }

    /// Scope the view to a playlist (or back to the whole catalog).
    /// Unknown ids are treated as `None`.
    pub fn set_playlist(&mut self, playlist: Option<PlaylistId>, catalog: &Catalog) {
        self.playlist = playlist.filter(|&id| id < catalog.playlist_count());
        self.rebuild(catalog);
    }

    /// Recompute membership after the catalog's playlists were reloaded.
    pub fn refresh(&mut self, catalog: &Catalog) {
        self.set_playlist(self.playlist, catalog);
    }

    fn rebuild(&mut self, catalog: &Catalog) {
        let prev = self.cursor_track();

        let source: Vec<TrackIndex> = match self.playlist {
            Some(id) => catalog.members(id).to_vec(),
            None => (0..catalog.len()).collect(),
        };
        self.entries = match &self.filter {
            Some(re) => source
                .into_iter()
                .filter(|&i| catalog.name(i).is_some_and(|n| re.is_match(n)))
                .collect(),
            None => source,
        };

        // Keep the cursor on the same track if it survived
        self.cursor = prev.and_then(|t| self.position_of(t)).unwrap_or(0);
        self.clamp_scroll();
        self.ensure_visible();
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    pub fn move_cursor(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let target = self.cursor.saturating_add_signed(delta);
        self.jump(target);
    }

    /// Put the cursor on `pos`, clamped to the view.
    pub fn jump(&mut self, pos: usize) {
        if self.entries.is_empty() {
            self.cursor = 0;
            return;
        }
        self.cursor = pos.min(self.entries.len() - 1);
        self.ensure_visible();
    }

    pub fn jump_last(&mut self) {
        self.jump(self.entries.len().saturating_sub(1));
    }

    /// Move the cursor onto `track` if it is visible. Returns whether it was.
    pub fn jump_to_track(&mut self, track: TrackIndex) -> bool {
        match self.position_of(track) {
            Some(pos) => {
                self.jump(pos);
                true
            }
            None => false,
        }
    }

    // ── Scroll window ─────────────────────────────────────────────────────────

    pub fn set_list_rows(&mut self, rows: usize) {
        self.list_rows = rows.max(1);
        self.clamp_scroll();
        self.ensure_visible();
    }

    /// Move the window without moving the cursor, unless the cursor would
    /// leave the window, in which case it is pulled back to the nearest edge.
    pub fn scroll(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        self.scroll_offset = self
            .scroll_offset
            .saturating_add_signed(delta)
            .min(self.max_offset());

        let last_visible = (self.scroll_offset + self.list_rows - 1).min(self.entries.len() - 1);
        self.cursor = self.cursor.clamp(self.scroll_offset, last_visible);
    }

    fn max_offset(&self) -> usize {
        self.entries.len().saturating_sub(self.list_rows)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_offset = self.scroll_offset.min(self.max_offset());
    }

    /// Minimal edge-scroll so the cursor sits inside the window.
    fn ensure_visible(&mut self) {
        if self.cursor < self.scroll_offset {
            self.scroll_offset = self.cursor;
        } else if self.cursor >= self.scroll_offset + self.list_rows {
            self.scroll_offset = self.cursor + 1 - self.list_rows;
        }
    }
}
