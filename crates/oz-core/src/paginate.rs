//! Batch rendering of a history list with scroll-driven extension.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::HistoryConfig;
use crate::history::{EntryId, HistoryEntry};
use crate::markup::SafeMarkup;
use crate::pipeline::RenderPipeline;

/// Why the list shows nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// The collection itself is empty.
    NoEntries,
    /// The active filter matched nothing.
    NoMatches,
}

/// One rendered list item.
#[derive(Debug, Clone)]
pub struct RenderedEntry {
    pub id: EntryId,
    /// The entry this was rendered from.
    pub source: Arc<HistoryEntry>,
    pub timestamp: i64,
    pub doc: SafeMarkup,
    /// Reveal delay for the staggered first batch.
    pub delay: Option<Duration>,
}

/// Display surface for the history list.
pub trait ListSurface {
    fn show_empty(&mut self, state: EmptyState);
    fn clear(&mut self);
    fn append(&mut self, entry: RenderedEntry);
}

/// Viewport geometry in host units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    pub offset: u32,
    pub viewport: u32,
    pub content: u32,
}

impl ScrollMetrics {
    pub fn distance_to_bottom(&self) -> u32 {
        self.content
            .saturating_sub(self.offset.saturating_add(self.viewport))
    }
}

/// The filtered list being shown and how much of it has been rendered.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    active: Vec<Arc<HistoryEntry>>,
    cursor: usize,
}

impl ViewState {
    pub fn new(active: Vec<Arc<HistoryEntry>>) -> Self {
        Self { active, cursor: 0 }
    }

    pub fn active(&self) -> &[Arc<HistoryEntry>] {
        &self.active
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.active.len()
    }

    /// Take the next slice of up to `size` entries and advance past it.
    fn take_batch(&mut self, size: usize) -> Vec<Arc<HistoryEntry>> {
        let end = (self.cursor + size).min(self.active.len());
        let batch = self.active[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }
}

/// Renders a [`ViewState`] into a [`ListSurface`] one batch at a time.
pub struct PaginatedList<L: ListSurface> {
    pipeline: RenderPipeline,
    config: HistoryConfig,
    surface: L,
    view: ViewState,
}

impl<L: ListSurface> PaginatedList<L> {
    pub fn new(pipeline: RenderPipeline, config: HistoryConfig, surface: L) -> Self {
        Self {
            pipeline,
            config,
            surface,
            view: ViewState::default(),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn surface(&self) -> &L {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut L {
        &mut self.surface
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Show `list`, where `total` is the size of the unfiltered collection.
    pub fn reset(&mut self, list: Vec<Arc<HistoryEntry>>, total: usize) {
        self.view = ViewState::new(list);
        self.surface.clear();
        if total == 0 {
            self.surface.show_empty(EmptyState::NoEntries);
        } else if self.view.active.is_empty() {
            self.surface.show_empty(EmptyState::NoMatches);
        } else {
            let rendered = self.render_batch(true);
            debug!(
                entries = self.view.active.len(),
                rendered, "History list reset"
            );
        }
    }

    /// Render the next batch. Returns how many entries were rendered.
    pub fn append_next_batch(&mut self) -> usize {
        self.render_batch(false)
    }

    /// Extend the list when the viewport is near the bottom.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> usize {
        if metrics.distance_to_bottom() > self.config.scroll_threshold || !self.view.has_more() {
            return 0;
        }
        self.append_next_batch()
    }

    fn render_batch(&mut self, staggered: bool) -> usize {
        let batch = self.view.take_batch(self.config.batch_size.max(1));
        if batch.is_empty() {
            return 0;
        }

        let stagger = self.config.stagger();
        let mut rendered = 0u32;
        for entry in batch {
            let (Some(id), Some(text)) = (entry.id.clone(), entry.text.as_deref()) else {
                continue;
            };
            let doc = self.pipeline.render(text);
            self.surface.append(RenderedEntry {
                id,
                source: Arc::clone(&entry),
                timestamp: entry.timestamp,
                doc,
                delay: staggered.then(|| stagger * rendered),
            });
            rendered += 1;
        }
        trace!(
            rendered,
            cursor = self.view.cursor,
            total = self.view.active.len(),
            "Rendered history batch"
        );
        rendered as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::highlight::PlainHighlighter;
    use crate::testing::{ListEvent, RecordingListSurface};

    fn list(config: HistoryConfig) -> PaginatedList<RecordingListSurface> {
        let pipeline = RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter));
        PaginatedList::new(pipeline, config, RecordingListSurface::default())
    }

    fn entries(n: usize) -> Vec<Arc<HistoryEntry>> {
        (0..n)
            .map(|i| Arc::new(HistoryEntry::new(i as i64, format!("entry {i}"), i as i64)))
            .collect()
    }

    #[test]
    fn test_batches_of_twenty() {
        let mut list = list(HistoryConfig::default());
        let all = entries(45);
        list.reset(all, 45);
        assert_eq!(list.surface().appended(), 20);
        assert_eq!(list.view().cursor(), 20);

        assert_eq!(list.append_next_batch(), 20);
        assert_eq!(list.append_next_batch(), 5);
        assert_eq!(list.append_next_batch(), 0);
        assert_eq!(list.view().cursor(), 45);
        assert_eq!(list.surface().appended(), 45);
    }

    #[test]
    fn test_three_appends_render_20_20_5() {
        let mut list = list(HistoryConfig::default());
        list.view = ViewState::new(entries(45));
        assert_eq!(list.append_next_batch(), 20);
        assert_eq!(list.append_next_batch(), 20);
        assert_eq!(list.append_next_batch(), 5);
        assert_eq!(list.append_next_batch(), 0);
    }

    #[test]
    fn test_first_batch_staggered_only() {
        let config = HistoryConfig::default()
            .with_batch_size(3)
            .with_stagger(Duration::from_millis(30));
        let mut list = list(config);
        list.reset(entries(6), 6);
        list.append_next_batch();
        let delays: Vec<Option<Duration>> =
            list.surface().entries().map(|e| e.delay).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::ZERO),
                Some(Duration::from_millis(30)),
                Some(Duration::from_millis(60)),
                None,
                None,
                None
            ]
        );
    }

    #[test]
    fn test_empty_states() {
        let mut list = list(HistoryConfig::default());
        list.reset(Vec::new(), 0);
        assert_eq!(list.surface().events.last(), Some(&ListEvent::Empty(EmptyState::NoEntries)));
        list.reset(Vec::new(), 10);
        assert_eq!(list.surface().events.last(), Some(&ListEvent::Empty(EmptyState::NoMatches)));
    }

    #[test]
    fn test_reset_clears_before_rendering() {
        let mut list = list(HistoryConfig::default());
        list.reset(entries(2), 2);
        list.reset(entries(1), 1);
        assert_eq!(list.surface().appended(), 1);
        assert_eq!(list.surface().clears(), 2);
    }

    #[test]
    fn test_malformed_entries_skipped_but_consumed() {
        let mut all = entries(3);
        all.insert(
            1,
            Arc::new(HistoryEntry {
                id: None,
                text: Some("orphan".into()),
                timestamp: 0,
            }),
        );
        let mut list = list(HistoryConfig::default().with_batch_size(2));
        list.reset(all, 4);
        assert_eq!(list.surface().appended(), 1);
        assert_eq!(list.view().cursor(), 2);
        assert_eq!(list.append_next_batch(), 2);
        assert!(!list.view().has_more());
    }

    #[test]
    fn test_rendered_entry_keeps_source() {
        let all = vec![
            Arc::new(HistoryEntry::new(7, "first", 2)),
            Arc::new(HistoryEntry::new(7, "second", 1)),
        ];
        let mut list = list(HistoryConfig::default());
        list.reset(all.clone(), 2);
        let sources: Vec<_> = list.surface().entries().map(|e| Arc::clone(&e.source)).collect();
        assert!(Arc::ptr_eq(&sources[0], &all[0]));
        assert!(Arc::ptr_eq(&sources[1], &all[1]));
    }

    #[test]
    fn test_scroll_threshold() {
        let mut list = list(HistoryConfig::default());
        list.reset(entries(45), 45);
        let far = ScrollMetrics {
            offset: 0,
            viewport: 500,
            content: 2000,
        };
        assert_eq!(list.on_scroll(far), 0);

        let near = ScrollMetrics {
            offset: 1450,
            viewport: 500,
            content: 2000,
        };
        assert_eq!(list.on_scroll(near), 20);
        assert_eq!(list.on_scroll(near), 5);
        assert_eq!(list.on_scroll(near), 0);
        assert_eq!(list.view().cursor(), 45);
    }

    #[test]
    fn test_distance_saturates() {
        let metrics = ScrollMetrics {
            offset: 900,
            viewport: 500,
            content: 1000,
        };
        assert_eq!(metrics.distance_to_bottom(), 0);
    }
}
