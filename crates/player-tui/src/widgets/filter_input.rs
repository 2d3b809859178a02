//! FilterInput: wraps tui-input for the search line.

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_FILTER_BG, C_FILTER_FG};

#[derive(Debug, PartialEq)]
pub enum FilterAction {
    Changed(String),
    Confirmed,
    Cancelled,
    None,
}

#[derive(Default)]
pub struct FilterInput {
    input: Input,
    active: bool,
}

impl FilterInput {
    pub fn activate(&mut self) {
        self.input = Input::default();
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enter keeps the text, Esc abandons it. Anything else edits the line;
    /// `Changed` is only reported when the text actually changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> FilterAction {
        match key.code {
            KeyCode::Esc => {
                self.deactivate();
                FilterAction::Cancelled
            }
            KeyCode::Enter => {
                self.deactivate();
                FilterAction::Confirmed
            }
            _ => {
                let before = self.input.value().to_string();
                self.input.handle_event(&Event::Key(key));
                if self.input.value() == before {
                    FilterAction::None
                } else {
                    FilterAction::Changed(self.input.value().to_string())
                }
            }
        }
    }

    /// Render as `/text_` on one row.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        let scroll = self
            .input
            .visual_scroll(area.width.saturating_sub(2) as usize);
        let value = self.input.value();
        let shown: String = value.chars().skip(scroll).collect();
        let line = Line::from(vec![Span::styled(
            format!("/{}_", shown),
            Style::default().fg(C_FILTER_FG),
        )]);
        frame.render_widget(
            Paragraph::new(line).style(Style::default().bg(C_FILTER_BG)),
            area,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_typing_reports_text() {
        let mut f = FilterInput::default();
        f.activate();
        assert_eq!(f.handle_key(key(KeyCode::Char('a'))), FilterAction::Changed("a".into()));
        assert_eq!(f.handle_key(key(KeyCode::Char('b'))), FilterAction::Changed("ab".into()));
        assert_eq!(f.handle_key(key(KeyCode::Backspace)), FilterAction::Changed("a".into()));
        assert_eq!(f.text(), "a");
    }

    #[test]
    fn test_noop_keys_report_nothing() {
        let mut f = FilterInput::default();
        f.activate();
        assert_eq!(f.handle_key(key(KeyCode::Backspace)), FilterAction::None);
        assert_eq!(f.handle_key(key(KeyCode::Up)), FilterAction::None);
    }

    #[test]
    fn test_enter_and_esc_close() {
        let mut f = FilterInput::default();
        f.activate();
        f.handle_key(key(KeyCode::Char('x')));
        assert_eq!(f.handle_key(key(KeyCode::Enter)), FilterAction::Confirmed);
        assert!(!f.is_active());
        assert_eq!(f.text(), "x");

        f.activate();
        assert_eq!(f.text(), "");
        assert_eq!(f.handle_key(key(KeyCode::Esc)), FilterAction::Cancelled);
        assert!(!f.is_active());
    }
}
