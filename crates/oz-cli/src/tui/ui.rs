//! UI layout rendering for the history browser.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use oz_core::Clipboard;

use super::app::HistoryApp;
use super::widgets::{list_block, search_bar, EntryList, SearchBar, StatusBar};

/// Layout regions
struct LayoutRegions {
    status: Rect,
    list: Rect,
    search: Rect,
}

fn create_layout(area: Rect) -> LayoutRegions {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Status bar
            Constraint::Min(3),    // Entry list
            Constraint::Length(2), // Search field
        ])
        .split(area);

    LayoutRegions {
        status: chunks[0],
        list: chunks[1],
        search: chunks[2],
    }
}

/// Area inside the list border, used to lay entries out before drawing.
pub fn list_inner_area(area: Rect) -> Rect {
    list_block("").inner(create_layout(area).list)
}

/// Render the entire TUI
pub fn render<C: Clipboard>(app: &HistoryApp<C>, frame: &mut Frame) {
    let area = frame.area();
    let chunks = create_layout(area);
    let now = std::time::Instant::now();

    let view = app.view();
    let status = StatusBar::new(view.store().len())
        .counts(
            view.list().view().active().len(),
            view.list().surface().len(),
        )
        .newest_first(view.newest_first())
        .query(view.query())
        .notice(app.notices.current(now));
    frame.render_widget(status, chunks.status);

    frame.render_widget(
        EntryList::new(app.rows()).scroll(app.scroll.offset()),
        chunks.list,
    );

    let overlay = app.show_help || app.confirm_clear;
    let search = SearchBar::new(&app.search)
        .active(!overlay)
        .pending(app.search_pending())
        .hint("F1 help");
    frame.render_widget(search, chunks.search);

    if !overlay {
        // The search field sits under a one-row top border.
        let field = chunks.search;
        let scroll = SearchBar::scroll_for(&app.search, field.width);
        let cursor = app.search.visual_cursor().saturating_sub(scroll);
        let x = field.x + (search_bar::PROMPT.len() + cursor) as u16;
        frame.set_cursor_position((x.min(field.right().saturating_sub(1)), field.y + 1));
    }

    if app.confirm_clear {
        render_confirm_overlay(frame, area, view.store().len());
    }
    if app.show_help {
        render_help_overlay(frame, area);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_confirm_overlay(frame: &mut Frame, area: Rect, total: usize) {
    let overlay_area = centered(area, 44, 5);
    frame.render_widget(Clear, overlay_area);

    let text = vec![
        Line::from(format!("Delete all {} history entries?", total)),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Style::default().fg(Color::Red)),
            Span::raw(" delete   "),
            Span::styled("n", Style::default().fg(Color::Green)),
            Span::raw(" keep"),
        ]),
    ];
    let prompt = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(" Clear history ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().bg(Color::Black));
    frame.render_widget(prompt, overlay_area);
}

/// Render help overlay
fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let overlay_area = centered(area, 56, 20);
    frame.render_widget(Clear, overlay_area);

    let help_text = vec![
        Line::from(Span::styled(
            "oz history",
            Style::default().fg(Color::Green),
        )),
        Line::from(""),
        Line::from(Span::styled("Navigation:", Style::default().fg(Color::Cyan))),
        Line::from("  Up/Down      Select entry"),
        Line::from("  PgUp/PgDn    Scroll"),
        Line::from("  Ctrl+Home    Scroll to top"),
        Line::from("  Ctrl+End     Scroll to bottom"),
        Line::from(""),
        Line::from(Span::styled("Entries:", Style::default().fg(Color::Cyan))),
        Line::from("  type         Search"),
        Line::from("  Ctrl+S       Toggle newest/oldest first"),
        Line::from("  Tab          Focus next code block"),
        Line::from("  Enter        Expand/collapse focused block"),
        Line::from("  Ctrl+Y       Copy block (or whole entry)"),
        Line::from("  Ctrl+X       Clear all history"),
        Line::from(""),
        Line::from("  Esc/Ctrl+C   Quit"),
        Line::from(Span::styled(
            "Press any key to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(help, overlay_area);
}
