//! Persisted interaction history: loading, ordering, search and the view
//! that ties them to a paginated list.

mod entry;
mod index;
mod persist;
mod store;
mod view;

pub use entry::{EntryId, HistoryEntry};
pub use index::SearchIndex;
pub use persist::{JsonHistoryFile, PersistenceSource, MAX_HISTORY_ENTRIES};
pub use store::HistoryStore;
pub use view::HistoryView;
