//! Tunables for rendering, streaming and history pagination.
//!
//! Every struct deserializes with per-field defaults so a partial TOML table
//! (or none at all) yields the reference behaviour.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rich text rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Code blocks with more lines than this become collapsible.
    #[serde(default = "default_collapse_threshold_lines")]
    pub collapse_threshold_lines: usize,

    /// Replace straight quotes and double dashes with typographic forms.
    #[serde(default = "default_true")]
    pub smart_punctuation: bool,

    /// Render single newlines as visual line breaks.
    #[serde(default = "default_true")]
    pub hard_breaks: bool,

    /// Turn bare URLs into links.
    #[serde(default = "default_true")]
    pub autolink: bool,
}

fn default_true() -> bool {
    true
}

fn default_collapse_threshold_lines() -> usize {
    20
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            collapse_threshold_lines: default_collapse_threshold_lines(),
            smart_punctuation: true,
            hard_breaks: true,
            autolink: true,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collapse_threshold(mut self, lines: usize) -> Self {
        self.collapse_threshold_lines = lines;
        self
    }

    pub fn with_smart_punctuation(mut self, enabled: bool) -> Self {
        self.smart_punctuation = enabled;
        self
    }

    pub fn with_hard_breaks(mut self, enabled: bool) -> Self {
        self.hard_breaks = enabled;
        self
    }

    pub fn with_autolink(mut self, enabled: bool) -> Self {
        self.autolink = enabled;
        self
    }
}

/// Live stream cadence and surface sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Interval between re-render ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Lower bound for the hosting surface height.
    #[serde(default = "default_min_height")]
    pub min_height: u32,

    /// Upper bound for the hosting surface height.
    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Appended to the buffer when a generation completes.
    #[serde(default = "default_trailing_separator")]
    pub trailing_separator: String,

    /// Height of one rendered line, used by surfaces that measure in lines.
    #[serde(default = "default_line_height")]
    pub line_height: u32,
}

fn default_tick_interval_ms() -> u64 {
    200
}

fn default_min_height() -> u32 {
    120
}

fn default_max_height() -> u32 {
    600
}

fn default_trailing_separator() -> String {
    "\n\n".to_string()
}

fn default_line_height() -> u32 {
    20
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_height: default_min_height(),
            max_height: default_max_height(),
            trailing_separator: default_trailing_separator(),
            line_height: default_line_height(),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_height_bounds(mut self, min_height: u32, max_height: u32) -> Self {
        self.min_height = min_height;
        self.max_height = max_height.max(min_height);
        self
    }

    pub fn with_trailing_separator(mut self, separator: impl Into<String>) -> Self {
        self.trailing_separator = separator.into();
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Clamp a measured content height into the configured bounds.
    pub fn clamp_height(&self, measured: u32) -> u32 {
        measured.clamp(self.min_height, self.max_height.max(self.min_height))
    }
}

/// History list pagination and search behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries rendered per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Distance from the bottom of the viewport that triggers the next batch.
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: u32,

    /// Per-item reveal delay for the first batch after a reset.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Quiet period before a search query is applied.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Newest entries first when the view opens.
    #[serde(default = "default_true")]
    pub newest_first: bool,
}

fn default_batch_size() -> usize {
    20
}

fn default_scroll_threshold() -> u32 {
    100
}

fn default_stagger_ms() -> u64 {
    30
}

fn default_search_debounce_ms() -> u64 {
    250
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            scroll_threshold: default_scroll_threshold(),
            stagger_ms: default_stagger_ms(),
            search_debounce_ms: default_search_debounce_ms(),
            newest_first: true,
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_scroll_threshold(mut self, threshold: u32) -> Self {
        self.scroll_threshold = threshold;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger_ms = stagger.as_millis() as u64;
        self
    }

    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_newest_first(mut self, newest_first: bool) -> Self {
        self.newest_first = newest_first;
        self
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

/// Syntax highlighting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of a bundled syntect theme.
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "base16-ocean.dark".to_string()
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            theme: default_theme(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let render: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(render.collapse_threshold_lines, 20);
        assert!(render.smart_punctuation);

        let stream: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(stream.tick_interval_ms, 200);
        assert_eq!(stream.trailing_separator, "\n\n");

        let history: HistoryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(history.batch_size, 20);
        assert_eq!(history.scroll_threshold, 100);
        assert_eq!(history.search_debounce_ms, 250);
        assert!(history.newest_first);
    }

    #[test]
    fn test_partial_override() {
        let history: HistoryConfig = serde_json::from_str(r#"{"batch_size": 5}"#).unwrap();
        assert_eq!(history.batch_size, 5);
        assert_eq!(history.stagger_ms, 30);
    }

    #[test]
    fn test_clamp_height() {
        let config = StreamConfig::new().with_height_bounds(100, 300);
        assert_eq!(config.clamp_height(20), 100);
        assert_eq!(config.clamp_height(250), 250);
        assert_eq!(config.clamp_height(900), 300);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let mut config = StreamConfig::new();
        config.min_height = 500;
        config.max_height = 100;
        assert_eq!(config.clamp_height(50), 500);
    }

    #[test]
    fn test_builders() {
        let config = HistoryConfig::new()
            .with_batch_size(0)
            .with_stagger(Duration::from_millis(10));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.stagger(), Duration::from_millis(10));
    }
}
