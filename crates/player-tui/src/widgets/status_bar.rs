//! Status bar: now-playing line, key hints and separators.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use player_proto::playback::{LoopMode, PlaybackState};

use crate::mpv::EnginePhase;
use crate::theme::{C_ACCENT, C_MODE_NORMAL, C_MODE_SEARCH, C_MUTED, C_PLAYING, C_SEPARATOR, C_TAG};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    Search,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Search => "SEARCH",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::Search => C_MODE_SEARCH,
        }
    }
}

/// `[repeat]`, `[shuffle]` or nothing.
pub fn mode_tag(playback: &PlaybackState) -> &'static str {
    if playback.loop_mode() == LoopMode::Single {
        "[repeat]"
    } else if playback.shuffle() {
        "[shuffle]"
    } else {
        ""
    }
}

/// `[no engine]` when the engine could not be started for this track.
pub fn state_tag(playback: &PlaybackState, phase: EnginePhase) -> &'static str {
    if phase == EnginePhase::Failed {
        "[no engine]"
    } else if playback.paused {
        "[paused]"
    } else {
        "[playing]"
    }
}

/// `[playing][shuffle] name  vol 80%`
pub fn draw_now_playing(
    frame: &mut Frame,
    area: Rect,
    playback: &PlaybackState,
    phase: EnginePhase,
    name: &str,
) {
    let state_color = if phase == EnginePhase::Failed {
        C_ACCENT
    } else {
        C_PLAYING
    };
    let line = Line::from(vec![
        Span::styled(
            state_tag(playback, phase),
            Style::default().fg(state_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(mode_tag(playback), Style::default().fg(C_TAG)),
        Span::raw(" "),
        Span::styled(name.to_string(), Style::default().fg(C_PLAYING)),
        Span::styled(
            format!("  vol {}%", playback.volume),
            Style::default().fg(C_MUTED),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Draw a horizontal separator line.
pub fn draw_separator(frame: &mut Frame, area: Rect) {
    let line = Line::from(Span::styled(
        "─".repeat(area.width as usize),
        Style::default().fg(C_SEPARATOR),
    ));
    frame.render_widget(Paragraph::new(line), area);
}

/// Mode label plus the key hints for that mode.
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode, volume: u8) {
    let keys = match mode {
        InputMode::Normal => format!(
            " j/k nav  spc play/pause  h/l seek  -/+ vol {}%  m loop  n shuffle  p playlist  / search  esc stop  q quit",
            volume
        ),
        InputMode::Search => " type to filter  Enter keep  Esc clear".to_string(),
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(mode.color())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
