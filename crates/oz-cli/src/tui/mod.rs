//! Terminal history browser using ratatui.
//!
//! Shows the history list in batches, with a debounced search field, sort
//! toggle, code block focus and copy, and a confirmed clear.

mod app;
mod events;
mod list;
mod scroll;
mod ui;
mod widgets;

pub use app::run_history;
