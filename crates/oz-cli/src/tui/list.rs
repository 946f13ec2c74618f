//! List surface backing the history browser.

use std::sync::Arc;
use std::time::Instant;

use ratatui::text::Text;

use oz_core::{EmptyState, EntryId, HistoryEntry, ListSurface, RenderedEntry, SafeMarkup};

use crate::terminal::{markup_to_text, wrap_rows};

/// One rendered history entry.
pub struct ListItem {
    pub id: EntryId,
    pub timestamp: i64,
    pub doc: SafeMarkup,
    pub source: Arc<HistoryEntry>,
    /// When a staggered entry becomes visible; `None` shows it at once.
    reveal_at: Option<Instant>,
    /// Body text for the last (width, focused block) it was laid out with.
    cache: Option<(usize, Option<usize>, Text<'static>)>,
}

impl ListItem {
    pub fn is_revealed(&self, now: Instant) -> bool {
        self.reveal_at.is_none_or(|at| at <= now)
    }

    /// Body rows wrapped to `width`, re-rendered only when the inputs change.
    pub fn body(&mut self, width: usize, focused: Option<usize>) -> &Text<'static> {
        if !matches!(&self.cache, Some((w, f, _)) if *w == width && *f == focused) {
            self.cache = None;
        }
        let (_, _, text) = self
            .cache
            .get_or_insert_with(|| {
                let text = markup_to_text(&self.doc, width, focused);
                (width, focused, wrap_rows(text, width))
            });
        text
    }

    /// Toggle block `index` in place. Terminal selections never reach the
    /// header, so there is no selection to guard against.
    pub fn toggle_block(&mut self, index: usize) -> bool {
        match self.doc.click_block(index, "") {
            Ok(toggled) => {
                if toggled {
                    self.cache = None;
                }
                toggled
            }
            Err(_) => false,
        }
    }
}

/// Items appended by the paginated list, with staggered reveal times.
#[derive(Default)]
pub struct EntryListSurface {
    items: Vec<ListItem>,
    empty: Option<EmptyState>,
}

impl EntryListSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [ListItem] {
        &mut self.items
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut ListItem> {
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn empty_state(&self) -> Option<EmptyState> {
        self.empty
    }

    /// Whether any item is still waiting for its reveal time.
    pub fn has_pending(&self, now: Instant) -> bool {
        self.items.iter().any(|item| !item.is_revealed(now))
    }
}

impl ListSurface for EntryListSurface {
    fn show_empty(&mut self, state: EmptyState) {
        self.empty = Some(state);
    }

    fn clear(&mut self) {
        self.items.clear();
        self.empty = None;
    }

    fn append(&mut self, entry: RenderedEntry) {
        let reveal_at = entry
            .delay
            .filter(|delay| !delay.is_zero())
            .map(|delay| Instant::now() + delay);
        self.items.push(ListItem {
            id: entry.id,
            timestamp: entry.timestamp,
            doc: entry.doc,
            source: entry.source,
            reveal_at,
            cache: None,
        });
    }
}
