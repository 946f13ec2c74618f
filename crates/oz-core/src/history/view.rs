use std::time::Instant;

use tracing::{debug, warn};

use super::entry::HistoryEntry;
use super::persist::PersistenceSource;
use super::store::HistoryStore;
use crate::config::HistoryConfig;
use crate::debounce::Debouncer;
use crate::paginate::{ListSurface, PaginatedList, ScrollMetrics};
use crate::pipeline::RenderPipeline;
use crate::{Error, Result};

/// History browser state: the store, the current query and sort, and the
/// paginated list they feed.
///
/// Every mutation ends in [`HistoryView::refresh`], which hands the filtered,
/// sorted list to the paginator.
pub struct HistoryView<L: ListSurface> {
    store: HistoryStore,
    list: PaginatedList<L>,
    query: String,
    search: Debouncer<String>,
}

impl<L: ListSurface> HistoryView<L> {
    pub fn new(config: HistoryConfig, pipeline: RenderPipeline, surface: L) -> Self {
        let store = HistoryStore::new(config.newest_first);
        let search = Debouncer::new(config.search_debounce());
        Self {
            store,
            list: PaginatedList::new(pipeline, config, surface),
            query: String::new(),
            search,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn list(&self) -> &PaginatedList<L> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut PaginatedList<L> {
        &mut self.list
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn newest_first(&self) -> bool {
        self.store.newest_first()
    }

    /// Load from `source`. A failing source leaves an empty collection.
    pub async fn load(&mut self, source: &dyn PersistenceSource) -> usize {
        let entries = match source.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "History load failed, showing empty history");
                Vec::new()
            }
        };
        self.load_entries(entries)
    }

    pub fn load_entries(&mut self, entries: Vec<HistoryEntry>) -> usize {
        self.store.load(entries);
        self.refresh();
        self.store.len()
    }

    /// Apply a query immediately.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.search.flush();
        self.query = query.into();
        self.refresh();
    }

    /// Record search-field input; applied by [`poll_search`](Self::poll_search)
    /// once typing pauses.
    pub fn search_input(&mut self, query: impl Into<String>, now: Instant) {
        self.search.push(query.into(), now);
    }

    /// Apply pending search input whose quiet period has elapsed.
    pub fn poll_search(&mut self, now: Instant) -> bool {
        match self.search.poll(now) {
            Some(query) if query != self.query => {
                self.query = query;
                self.refresh();
                true
            }
            _ => false,
        }
    }

    pub fn search_deadline(&self) -> Option<Instant> {
        self.search.deadline()
    }

    pub fn set_newest_first(&mut self, newest_first: bool) {
        self.store.sort(newest_first);
        self.refresh();
    }

    pub fn toggle_sort(&mut self) {
        self.set_newest_first(!self.store.newest_first());
    }

    /// Clear persisted history, then the in-memory state and the view.
    ///
    /// If the source refuses, nothing in memory changes.
    pub async fn clear_all(&mut self, source: &dyn PersistenceSource) -> Result<()> {
        if !source.clear_all().await? {
            return Err(Error::persistence("history store refused to clear"));
        }
        self.store.clear();
        self.refresh();
        debug!("History view cleared");
        Ok(())
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> usize {
        self.list.on_scroll(metrics)
    }

    fn refresh(&mut self) {
        let list = self.store.filter(&self.query);
        debug!(
            query = %self.query,
            newest_first = self.store.newest_first(),
            matches = list.len(),
            "Refreshing history view"
        );
        self.list.reset(list, self.store.len());
    }
}
