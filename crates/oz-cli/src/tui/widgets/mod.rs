//! TUI widget components.

pub mod entry_list;
pub mod search_bar;
pub mod status_bar;

pub use entry_list::{empty_message, entry_header, list_block, EntryList};
pub use search_bar::SearchBar;
pub use status_bar::StatusBar;
