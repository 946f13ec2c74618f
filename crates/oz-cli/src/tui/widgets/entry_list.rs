//! Scrollable list of rendered history entries.

use chrono::{DateTime, Local};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Widget},
};

use oz_core::{EmptyState, EntryId};

/// Bordered block the list is drawn in.
pub fn list_block(title: &str) -> Block<'_> {
    Block::default()
        .title(Span::styled(title, Style::default().fg(Color::Cyan)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

/// Header row shown above each entry.
pub fn entry_header(id: &EntryId, timestamp: i64, selected: bool) -> Line<'static> {
    let marker = if selected { "▶ " } else { "  " };
    let when = DateTime::from_timestamp_millis(timestamp)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string());

    let id_style = if selected {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Green)),
        Span::styled(format!("#{}", id), id_style),
        Span::styled(format!("  {}", when), Style::default().fg(Color::DarkGray)),
    ])
}

/// Placeholder row for an empty list.
pub fn empty_message(state: EmptyState, query: &str) -> Line<'static> {
    let message = match state {
        EmptyState::NoEntries => "No history yet".to_string(),
        EmptyState::NoMatches => format!("No entries match \"{}\"", query),
    };
    Line::from(Span::styled(message, Style::default().fg(Color::DarkGray)))
}

/// Pre-laid-out rows, drawn from `offset`.
pub struct EntryList<'a> {
    rows: &'a Text<'static>,
    offset: usize,
}

impl<'a> EntryList<'a> {
    pub fn new(rows: &'a Text<'static>) -> Self {
        Self { rows, offset: 0 }
    }

    pub fn scroll(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Widget for EntryList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = list_block(" History ");
        let inner = block.inner(area);
        block.render(area, buf);

        // Rows are already wrapped; copy only the visible window.
        let visible: Vec<Line<'static>> = self
            .rows
            .lines
            .iter()
            .skip(self.offset)
            .take(inner.height as usize)
            .cloned()
            .collect();
        Paragraph::new(visible).render(inner, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_marks_selection() {
        let line = entry_header(&EntryId::Number(7), 0, true);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.starts_with("▶ #7  "));

        let line = entry_header(&EntryId::from("abc"), 0, false);
        assert_eq!(line.spans[1].content, "#abc");
    }

    #[test]
    fn test_empty_messages() {
        let line = empty_message(EmptyState::NoMatches, "rust");
        assert_eq!(line.spans[0].content, "No entries match \"rust\"");
        let line = empty_message(EmptyState::NoEntries, "");
        assert_eq!(line.spans[0].content, "No history yet");
    }

    #[test]
    fn test_renders_visible_window() {
        let rows = Text::from(vec![
            Line::from("zero"),
            Line::from("one"),
            Line::from("two"),
        ]);
        let area = Rect::new(0, 0, 12, 3);
        let mut buf = Buffer::empty(area);
        EntryList::new(&rows).scroll(1).render(area, &mut buf);

        let inner_row: String = (1..11).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert_eq!(inner_row.trim_end(), "one");
    }
}
