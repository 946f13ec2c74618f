//! Status bar widget showing list counts, sort order and notices.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

use oz_core::{Notice, NoticeLevel};

/// Status bar display state
pub struct StatusBar<'a> {
    total: usize,
    matches: usize,
    shown: usize,
    newest_first: bool,
    query: &'a str,
    notice: Option<&'a Notice>,
}

impl<'a> StatusBar<'a> {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            matches: total,
            shown: 0,
            newest_first: true,
            query: "",
            notice: None,
        }
    }

    /// Entries matching the query, and how many of them are rendered.
    pub fn counts(mut self, matches: usize, shown: usize) -> Self {
        self.matches = matches;
        self.shown = shown;
        self
    }

    pub fn newest_first(mut self, newest_first: bool) -> Self {
        self.newest_first = newest_first;
        self
    }

    pub fn query(mut self, query: &'a str) -> Self {
        self.query = query;
        self
    }

    pub fn notice(mut self, notice: Option<&'a Notice>) -> Self {
        self.notice = notice;
        self
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style_label = Style::default().fg(Color::DarkGray);
        let style_value = Style::default().fg(Color::White);

        let mut spans = vec![
            Span::styled(" Entries: ", style_label),
            Span::styled(self.total.to_string(), style_value),
        ];

        if !self.query.is_empty() {
            spans.push(Span::styled(" | Matches: ", style_label));
            spans.push(Span::styled(self.matches.to_string(), style_value));
        }
        if self.shown < self.matches {
            spans.push(Span::styled(
                format!(" ({} shown)", self.shown),
                style_label,
            ));
        }

        spans.push(Span::styled(" | ", style_label));
        spans.push(Span::styled(
            if self.newest_first {
                "Newest first"
            } else {
                "Oldest first"
            },
            Style::default().fg(Color::Cyan),
        ));

        if let Some(notice) = self.notice {
            let style = match notice.level {
                NoticeLevel::Info => Style::default().fg(Color::Yellow),
                NoticeLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            };
            spans.push(Span::styled(" | ", style_label));
            spans.push(Span::styled(notice.message.as_str(), style));
        }

        Paragraph::new(Line::from(spans))
            .block(
                Block::default()
                    .borders(Borders::BOTTOM)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .render(area, buf);
    }
}
