//! Search field widget.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tui_input::Input;

pub const PROMPT: &str = "search> ";

/// Single-line search input with a right-aligned hint.
pub struct SearchBar<'a> {
    input: &'a Input,
    is_active: bool,
    pending: bool,
    hint: Option<&'a str>,
}

impl<'a> SearchBar<'a> {
    pub fn new(input: &'a Input) -> Self {
        Self {
            input,
            is_active: true,
            pending: false,
            hint: None,
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Typing has not been applied yet.
    pub fn pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }

    pub fn hint(mut self, hint: &'a str) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Horizontal scroll that keeps the cursor inside `width` columns.
    pub fn scroll_for(input: &Input, width: u16) -> usize {
        let text_width = (width as usize).saturating_sub(PROMPT.len() + 1);
        input.visual_scroll(text_width)
    }
}

impl Widget for SearchBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray));
        let inner = block.inner(area);
        block.render(area, buf);

        let prompt_style = if self.is_active {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let value_style = if self.pending {
            Style::default().fg(Color::Gray)
        } else {
            Style::default().fg(Color::White)
        };

        let scroll = Self::scroll_for(self.input, inner.width);
        let visible: String = self.input.value().chars().skip(scroll).collect();
        Paragraph::new(Line::from(vec![
            Span::styled(PROMPT, prompt_style),
            Span::styled(visible, value_style),
        ]))
        .render(inner, buf);

        if let Some(hint) = self.hint {
            let width = hint.chars().count() as u16;
            if inner.width > width + PROMPT.len() as u16 + 10 {
                let hint_area = Rect::new(inner.right() - width, inner.y, width, 1);
                Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray)))
                    .render(hint_area, buf);
            }
        }
    }
}
