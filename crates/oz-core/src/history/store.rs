use std::sync::Arc;

use tracing::debug;

use super::entry::HistoryEntry;
use super::index::SearchIndex;

/// In-memory history collection in load order and in display order, plus a
/// search index bound to the display order.
#[derive(Debug, Default)]
pub struct HistoryStore {
    loaded: Vec<Arc<HistoryEntry>>,
    sorted: Vec<Arc<HistoryEntry>>,
    index: Option<SearchIndex>,
    newest_first: bool,
}

impl HistoryStore {
    pub fn new(newest_first: bool) -> Self {
        Self {
            newest_first,
            ..Self::default()
        }
    }

    /// Replace the whole collection. The current sort direction is kept.
    pub fn load(&mut self, entries: Vec<HistoryEntry>) {
        self.loaded = entries.into_iter().map(Arc::new).collect();
        self.resort();
        debug!(entries = self.loaded.len(), newest_first = self.newest_first, "History loaded");
    }

    /// Order by timestamp; ties keep load order.
    pub fn sort(&mut self, newest_first: bool) {
        self.newest_first = newest_first;
        self.resort();
    }

    /// Entries matching `query` in relevance order, or everything in sort
    /// order when the query is blank.
    pub fn filter(&self, query: &str) -> Vec<Arc<HistoryEntry>> {
        let query = query.trim();
        if query.is_empty() {
            return self.sorted.clone();
        }
        match &self.index {
            Some(index) => index.search(query),
            None => {
                let needle = query.to_lowercase();
                self.sorted
                    .iter()
                    .filter(|e| e.text().to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            }
        }
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
        self.sorted.clear();
        self.index = Some(SearchIndex::default());
        debug_assert!(self.index_is_consistent());
        debug!("History cleared");
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Arc<HistoryEntry>] {
        &self.sorted
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn newest_first(&self) -> bool {
        self.newest_first
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// The index covers exactly the display-ordered collection.
    pub fn index_is_consistent(&self) -> bool {
        self.index
            .as_ref()
            .map_or(true, |index| index.is_bound_to(&self.sorted))
    }

    fn resort(&mut self) {
        let mut sorted = self.loaded.clone();
        if self.newest_first {
            sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        } else {
            sorted.sort_by_key(|e| e.timestamp);
        }
        self.sorted = sorted;
        self.index = Some(SearchIndex::build(&self.sorted));
        debug_assert!(self.index_is_consistent());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<HistoryEntry> {
        vec![
            HistoryEntry::new(1, "alpha note", 100),
            HistoryEntry::new(2, "beta note", 300),
            HistoryEntry::new(3, "gamma", 200),
            HistoryEntry::new(4, "delta note", 300),
        ]
    }

    fn ids(entries: &[Arc<HistoryEntry>]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.id.as_ref().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_newest_first_stable() {
        let mut store = HistoryStore::new(true);
        store.load(sample());
        assert_eq!(ids(store.entries()), vec!["2", "4", "3", "1"]);
    }

    #[test]
    fn test_oldest_first_stable() {
        let mut store = HistoryStore::new(false);
        store.load(sample());
        assert_eq!(ids(store.entries()), vec!["1", "3", "2", "4"]);
    }

    #[test]
    fn test_sort_rebinds_index() {
        let mut store = HistoryStore::new(false);
        store.load(sample());
        store.sort(true);
        assert!(store.index_is_consistent());
        assert_eq!(ids(&store.filter("note")), vec!["2", "4", "1"]);
        store.sort(false);
        assert_eq!(ids(&store.filter("note")), vec!["1", "2", "4"]);
    }

    #[test]
    fn test_empty_query_returns_sorted() {
        let mut store = HistoryStore::new(true);
        store.load(sample());
        assert_eq!(store.filter("").len(), 4);
        assert_eq!(ids(&store.filter("   ")), ids(store.entries()));
    }

    #[test]
    fn test_substring_fallback_without_index() {
        let store = HistoryStore::new(true);
        assert!(!store.has_index());
        assert!(store.filter("x").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut store = HistoryStore::new(true);
        store.load(sample());
        store.clear();
        assert!(store.is_empty());
        assert!(store.has_index());
        assert!(store.index_is_consistent());
        assert!(store.filter("note").is_empty());
    }

    #[test]
    fn test_reload_replaces() {
        let mut store = HistoryStore::new(true);
        store.load(sample());
        store.load(vec![HistoryEntry::new(9, "only", 1)]);
        assert_eq!(ids(store.entries()), vec!["9"]);
        assert!(store.index_is_consistent());
    }
}
