//! History browser state and event loop.

use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    style::{Color, Style},
    text::{Line, Span, Text},
    Terminal,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tui_input::{Input, InputRequest};

use oz_core::{
    copy_block, copy_text, Clipboard, HistoryView, JsonHistoryFile, NoticeBoard, NoticeLevel,
    PersistenceSource, RenderPipeline,
};

use super::events::{key_to_action, InputAction};
use super::list::EntryListSurface;
use super::scroll::ScrollState;
use super::ui;
use super::widgets::{empty_message, entry_header};
use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::debug_log::DebugLogger;
use crate::render::load_highlighter;

/// History browser state.
pub struct HistoryApp<C: Clipboard> {
    view: HistoryView<EntryListSurface>,
    source: Box<dyn PersistenceSource>,
    clipboard: C,
    logger: Option<Arc<DebugLogger>>,

    pub search: Input,
    selected: usize,
    focused_block: Option<usize>,
    /// Keep the selected entry in view on the next layout.
    follow_selection: bool,
    pub scroll: ScrollState,
    rows: Text<'static>,

    pub notices: NoticeBoard,
    pub confirm_clear: bool,
    pub show_help: bool,
    pub should_quit: bool,
}

impl<C: Clipboard> HistoryApp<C> {
    pub fn new(
        view: HistoryView<EntryListSurface>,
        source: Box<dyn PersistenceSource>,
        clipboard: C,
        notice_ttl: Duration,
    ) -> Self {
        Self {
            view,
            source,
            clipboard,
            logger: None,
            search: Input::default(),
            selected: 0,
            focused_block: None,
            follow_selection: true,
            scroll: ScrollState::default(),
            rows: Text::default(),
            notices: NoticeBoard::new(notice_ttl),
            confirm_clear: false,
            show_help: false,
            should_quit: false,
        }
    }

    pub fn with_logger(mut self, logger: Arc<DebugLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn view(&self) -> &HistoryView<EntryListSurface> {
        &self.view
    }

    /// Rows laid out by the last [`layout`](Self::layout).
    pub fn rows(&self) -> &Text<'static> {
        &self.rows
    }

    /// Search input not yet applied to the list.
    pub fn search_pending(&self) -> bool {
        self.view.search_deadline().is_some()
    }

    pub async fn load(&mut self) -> usize {
        let loaded = self.view.load(self.source.as_ref()).await;
        self.reset_selection();
        loaded
    }

    /// Apply due search input and expire notices.
    pub fn tick(&mut self, now: Instant) {
        if self.view.poll_search(now) {
            self.reset_selection();
            self.log_query();
        }
        self.notices.prune(now);
    }

    pub async fn handle_action(&mut self, action: InputAction, now: Instant) {
        match action {
            InputAction::Char(c) => self.edit_search(InputRequest::InsertChar(c), now),
            InputAction::Backspace => self.edit_search(InputRequest::DeletePrevChar, now),
            InputAction::Delete => self.edit_search(InputRequest::DeleteNextChar, now),
            InputAction::Left => self.edit_search(InputRequest::GoToPrevChar, now),
            InputAction::Right => self.edit_search(InputRequest::GoToNextChar, now),
            InputAction::Home => self.edit_search(InputRequest::GoToStart, now),
            InputAction::End => self.edit_search(InputRequest::GoToEnd, now),

            InputAction::SelectPrev => {
                if self.selected > 0 {
                    self.select(self.selected - 1);
                }
            }
            InputAction::SelectNext => {
                let revealed = self.revealed(now);
                if self.selected + 1 < revealed {
                    self.select(self.selected + 1);
                }
            }
            InputAction::PageUp => {
                self.follow_selection = false;
                self.scroll.page_up();
            }
            InputAction::PageDown => {
                self.follow_selection = false;
                self.scroll.page_down();
            }
            InputAction::ScrollToTop => {
                self.follow_selection = false;
                self.scroll.scroll_to_top();
            }
            InputAction::ScrollToBottom => {
                self.follow_selection = false;
                self.scroll.scroll_to_bottom();
            }

            InputAction::ToggleSort => {
                self.view.toggle_sort();
                self.reset_selection();
                let order = if self.view.newest_first() {
                    "Newest first"
                } else {
                    "Oldest first"
                };
                self.notices.push(order, NoticeLevel::Info, now);
                self.log_query();
            }
            InputAction::FocusNextBlock => self.focus_next_block(),
            InputAction::ToggleBlock => {
                let (selected, focused) = (self.selected, self.focused_block);
                if let Some(index) = focused {
                    if let Some(item) = self.view.list_mut().surface_mut().item_mut(selected) {
                        let toggled = item.toggle_block(index);
                        debug!(entry = selected, block = index, toggled, "Block toggle");
                    }
                    self.follow_selection = true;
                }
            }
            InputAction::Copy => self.copy_selection(now),

            InputAction::ClearHistory => {
                if self.view.store().is_empty() {
                    self.notices.push("History is already empty", NoticeLevel::Info, now);
                } else {
                    self.confirm_clear = true;
                }
            }
            InputAction::Confirm(yes) => {
                self.confirm_clear = false;
                if yes {
                    self.clear_history(now).await;
                }
            }
            InputAction::Help => self.show_help = !self.show_help,
            InputAction::Quit => self.should_quit = true,
        }
    }

    fn edit_search(&mut self, request: InputRequest, now: Instant) {
        let changed = self
            .search
            .handle(request)
            .is_some_and(|change| change.value);
        if changed {
            self.view.search_input(self.search.value(), now);
        }
    }

    fn select(&mut self, index: usize) {
        self.selected = index;
        self.focused_block = None;
        self.follow_selection = true;
    }

    fn reset_selection(&mut self) {
        self.select(0);
        self.scroll.scroll_to_top();
    }

    /// Entries whose reveal time has passed. Reveal times only increase down the list.
    fn revealed(&self, now: Instant) -> usize {
        self.view
            .list()
            .surface()
            .items()
            .iter()
            .take_while(|item| item.is_revealed(now))
            .count()
    }

    fn focus_next_block(&mut self) {
        let blocks = self
            .view
            .list()
            .surface()
            .items()
            .get(self.selected)
            .map_or(0, |item| item.doc.blocks().len());
        self.focused_block = match self.focused_block {
            _ if blocks == 0 => None,
            None => Some(0),
            Some(i) if i + 1 < blocks => Some(i + 1),
            Some(_) => None,
        };
        self.follow_selection = true;
    }

    fn copy_selection(&mut self, now: Instant) {
        let Some(item) = self.view.list().surface().items().get(self.selected) else {
            self.notices.push("Nothing to copy", NoticeLevel::Info, now);
            return;
        };
        match self.focused_block {
            Some(index) => {
                copy_block(&mut self.clipboard, &item.doc, index, &mut self.notices, now);
            }
            None => {
                copy_text(&mut self.clipboard, item.source.text(), &mut self.notices, now);
            }
        }
    }

    async fn clear_history(&mut self, now: Instant) {
        match self.view.clear_all(self.source.as_ref()).await {
            Ok(()) => {
                self.reset_selection();
                self.notices.push("History cleared", NoticeLevel::Info, now);
                info!("History cleared");
            }
            Err(e) => {
                self.notices
                    .push(format!("Could not clear history: {}", e), NoticeLevel::Error, now);
                if let Some(logger) = &self.logger {
                    logger.log_warning(&e.to_string());
                }
            }
        }
    }

    fn log_query(&self) {
        if let Some(logger) = &self.logger {
            logger.log_history_query(
                self.view.query(),
                self.view.newest_first(),
                self.view.list().view().active().len(),
            );
        }
    }

    /// Lay the list out for a `width` x `height` viewport, appending batches
    /// while the viewport sits within the scroll threshold of the bottom.
    pub fn layout(&mut self, width: u16, height: u16, now: Instant) {
        self.scroll.set_viewport_height(usize::from(height));
        loop {
            self.build_rows(width as usize, now);
            if self.view.list().surface().has_pending(now) {
                break;
            }
            if self.view.on_scroll(self.scroll.metrics()) == 0 {
                break;
            }
        }
    }

    fn build_rows(&mut self, width: usize, now: Instant) {
        let (selected, focused) = (self.selected, self.focused_block);
        let query = self.view.query().to_string();
        let has_more = self.view.list().view().has_more();
        let surface = self.view.list_mut().surface_mut();

        let mut rows: Vec<Line<'static>> = Vec::new();
        let mut selected_span = None;
        if let Some(state) = surface.empty_state() {
            rows.push(empty_message(state, &query));
        }
        for (i, item) in surface.items_mut().iter_mut().enumerate() {
            if !item.is_revealed(now) {
                break;
            }
            let start = rows.len();
            rows.push(entry_header(&item.id, item.timestamp, i == selected));
            let focus = if i == selected { focused } else { None };
            rows.extend(item.body(width, focus).lines.iter().cloned());
            rows.push(Line::default());
            if i == selected {
                selected_span = Some((start, rows.len() - start));
            }
        }
        if has_more && !surface.has_pending(now) {
            rows.push(Line::from(Span::styled(
                "… scroll for more",
                Style::default().fg(Color::DarkGray),
            )));
        }

        self.scroll.set_content_height(rows.len());
        if self.follow_selection {
            if let Some((start, len)) = selected_span {
                self.scroll.ensure_visible(start, len);
            }
        }
        self.rows = Text::from(rows);
    }
}

/// Set up panic hook to restore terminal on panic
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        original_hook(panic_info);
    }));
}

/// Run the history browser on `path`.
pub async fn run_history(
    config: &Config,
    path: PathBuf,
    logger: Option<Arc<DebugLogger>>,
) -> Result<()> {
    setup_panic_hook();

    let highlighter = load_highlighter(&config.highlight).await;
    let pipeline = RenderPipeline::new(config.render.clone(), highlighter);
    let view = HistoryView::new(config.tui_history(), pipeline, EntryListSurface::new());
    let source = JsonHistoryFile::new(&path);

    let mut app = HistoryApp::new(
        view,
        Box::new(source),
        SystemClipboard::new(),
        config.tui.notice_ttl(),
    );
    if let Some(logger) = logger {
        app = app.with_logger(logger);
    }

    let loaded = app.load().await;
    info!(path = %path.display(), entries = loaded, "History loaded");
    if let Some(logger) = &app.logger {
        logger.log_history_loaded(&path, loaded);
    }

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, crossterm::cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    terminal.show_cursor()?;

    result
}

async fn event_loop<C: Clipboard>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut HistoryApp<C>,
) -> Result<()> {
    let mut events = EventStream::new();
    // Redraw cadence for search debounce, staggered reveals and notice expiry
    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let now = Instant::now();
        app.tick(now);

        terminal.draw(|f| {
            let list = ui::list_inner_area(f.area());
            app.layout(list.width, list.height, now);
            ui::render(app, f);
        })?;

        if app.should_quit {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.show_help {
                        // Any key closes the help overlay
                        app.show_help = false;
                    } else if let Some(action) = key_to_action(key, app.confirm_clear) {
                        app.handle_action(action, Instant::now()).await;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }

    Ok(())
}
