//! Action enum: everything a key can ask the player to do, and the
//! normal-mode key map that produces them.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    // ── Navigation ───────────────────────────────────────────────────────────
    MoveCursor(isize),
    CursorFirst,
    CursorLast,
    /// Scroll-only, in lines.
    Scroll(isize),
    /// Scroll-only, in half pages (+1 down, -1 up).
    ScrollHalfPage(isize),
    JumpToPlaying,

    // ── Playback ─────────────────────────────────────────────────────────────
    PlayCursor,
    TogglePause,
    SeekBack,
    SeekForward,
    VolumeUp,
    VolumeDown,
    Stop,

    // ── Modes / view ─────────────────────────────────────────────────────────
    ToggleLoop,
    ToggleShuffle,
    CyclePlaylist,
    ReloadPlaylists,
    OpenSearch,

    Quit,
}

/// Normal-mode key map. Unbound keys yield `None`.
pub fn map_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            KeyCode::Char('d') => Some(Action::ScrollHalfPage(1)),
            KeyCode::Char('u') => Some(Action::ScrollHalfPage(-1)),
            KeyCode::Char('e') => Some(Action::Scroll(1)),
            KeyCode::Char('y') => Some(Action::Scroll(-1)),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Char('j') | KeyCode::Down => Action::MoveCursor(1),
        KeyCode::Char('k') | KeyCode::Up => Action::MoveCursor(-1),
        KeyCode::Char('g') | KeyCode::Home => Action::CursorFirst,
        KeyCode::Char('G') | KeyCode::End => Action::CursorLast,
        KeyCode::PageDown => Action::ScrollHalfPage(1),
        KeyCode::PageUp => Action::ScrollHalfPage(-1),
        KeyCode::Enter => Action::PlayCursor,
        KeyCode::Char(' ') => Action::TogglePause,
        KeyCode::Char('h') | KeyCode::Left => Action::SeekBack,
        KeyCode::Char('l') | KeyCode::Right => Action::SeekForward,
        KeyCode::Char('+') | KeyCode::Char('=') => Action::VolumeUp,
        KeyCode::Char('-') => Action::VolumeDown,
        KeyCode::Char('m') => Action::ToggleLoop,
        KeyCode::Char('n') => Action::ToggleShuffle,
        KeyCode::Char('p') => Action::CyclePlaylist,
        KeyCode::Char('r') => Action::ReloadPlaylists,
        KeyCode::Char('o') => Action::JumpToPlaying,
        KeyCode::Esc => Action::Stop,
        KeyCode::Char('/') | KeyCode::Char('?') => Action::OpenSearch,
        KeyCode::Char('q') => Action::Quit,
        _ => return None,
    };
    Some(action)
}
