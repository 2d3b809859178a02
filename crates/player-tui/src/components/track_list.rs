//! Track list: header line and the scrolled window of the current view.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::core::PlayerCore;
use crate::theme::{style_cursor, style_default, style_muted, style_playing, style_secondary, C_ACCENT};
use crate::widgets::status_bar::mode_tag;

/// `musicplayer  · road  · 12 tracks  · filter: ogg`
pub fn draw_header(frame: &mut Frame, area: Rect, core: &PlayerCore) {
    let view = core.view();
    let mut spans = vec![Span::styled(
        " musicplayer",
        Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
    )];
    if let Some(name) = core.playlist_name() {
        spans.push(Span::styled(format!("  · {}", name), style_default()));
    }
    spans.push(Span::styled(
        format!("  · {}/{} tracks", view.len(), core.catalog().len()),
        style_secondary(),
    ));
    if view.filter_active() {
        spans.push(Span::styled(
            format!("  · filter: {}", view.filter_text()),
            style_secondary(),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

pub fn draw_track_list(frame: &mut Frame, area: Rect, core: &PlayerCore) {
    let view = core.view();
    if view.is_empty() {
        let msg = if view.filter_active() {
            "  no tracks match filter"
        } else {
            "  playlist is empty"
        };
        frame.render_widget(Paragraph::new(Span::styled(msg, style_muted())), area);
        return;
    }

    let playing = core.playback().playing;
    let tag = mode_tag(core.playback());
    let width = area.width as usize;

    let items: Vec<ListItem> = view
        .visible_window()
        .iter()
        .enumerate()
        .map(|(row, &track)| {
            let is_cursor = view.scroll_offset() + row == view.cursor();
            let is_playing = playing == Some(track);
            let name = core.catalog().name(track).unwrap_or("?");
            let text = row_text(name, is_cursor, if is_playing { tag } else { "" }, width);

            let mut style = if is_playing { style_playing() } else { style_default() };
            if is_cursor {
                style = style_cursor().patch(style);
            }
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();

    frame.render_widget(List::new(items), area);
}

/// `> name [tag]`, clipped to `width` display columns.
pub fn row_text(name: &str, is_cursor: bool, tag: &str, width: usize) -> String {
    let prefix = if is_cursor { "> " } else { "  " };
    let suffix = if tag.is_empty() {
        String::new()
    } else {
        format!(" {}", tag)
    };
    let room = width.saturating_sub(prefix.len() + suffix.width());
    format!("{}{}{}", prefix, clip(name, room), suffix)
}

fn clip(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    if max > 0 {
        out.push('…');
    }
    out
}
