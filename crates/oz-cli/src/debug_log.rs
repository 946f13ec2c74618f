//! Trace logging for offline analysis of render and history behaviour.
//!
//! Writes JSON lines to a file: one record per stream state change, render
//! pass, history load and history query.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use oz_core::{SafeMarkup, StreamState};

const PREVIEW_CHARS: usize = 100;

/// Debug logger that writes JSON lines to a file.
pub struct DebugLogger {
    writer: Mutex<BufWriter<File>>,
}

impl DebugLogger {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn log<T: Serialize>(&self, event_type: &str, data: T) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            data: serde_json::to_value(data).unwrap_or_default(),
        };

        if let Ok(mut writer) = self.writer.lock() {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    pub fn log_state(&self, state: StreamState, buffer_len: usize, fragments: usize) {
        self.log(
            "stream_state",
            StreamStateEvent {
                state: state.to_string(),
                buffer_length: buffer_len,
                fragment_count: fragments,
            },
        );
    }

    /// Log a render pass over `source`.
    pub fn log_render(&self, source: &str, doc: &SafeMarkup) {
        self.log("render_pass", RenderSummary::new(source, doc));
    }

    pub fn log_history_loaded(&self, path: &Path, entries: usize) {
        self.log(
            "history_loaded",
            HistoryLoadedEvent {
                path: path.display().to_string(),
                entries,
            },
        );
    }

    pub fn log_history_query(&self, query: &str, newest_first: bool, matches: usize) {
        self.log(
            "history_query",
            HistoryQueryEvent {
                query: query.to_string(),
                newest_first,
                matches,
            },
        );
    }

    pub fn log_warning(&self, message: &str) {
        self.log(
            "warning",
            WarningEvent {
                message: message.to_string(),
            },
        );
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    event_type: String,
    data: serde_json::Value,
}

#[derive(Serialize)]
struct StreamStateEvent {
    state: String,
    buffer_length: usize,
    fragment_count: usize,
}

#[derive(Serialize)]
struct RenderSummary {
    source_length: usize,
    source_preview: String,
    segment_count: usize,
    block_count: usize,
    collapsible_blocks: usize,
    highlighted_blocks: usize,
}

impl RenderSummary {
    fn new(source: &str, doc: &SafeMarkup) -> Self {
        let preview = if source.chars().count() > PREVIEW_CHARS {
            let head: String = source.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", head)
        } else {
            source.to_string()
        };

        Self {
            source_length: source.len(),
            source_preview: preview,
            segment_count: doc.segments().len(),
            block_count: doc.blocks().len(),
            collapsible_blocks: doc.blocks().iter().filter(|b| b.is_collapsible()).count(),
            highlighted_blocks: doc.blocks().iter().filter(|b| b.is_highlighted()).count(),
        }
    }
}

#[derive(Serialize)]
struct HistoryLoadedEvent {
    path: String,
    entries: usize,
}

#[derive(Serialize)]
struct HistoryQueryEvent {
    query: String,
    newest_first: bool,
    matches: usize,
}

#[derive(Serialize)]
struct WarningEvent {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use oz_core::{PlainHighlighter, RenderConfig, RenderPipeline};
    use tempfile::NamedTempFile;

    #[test]
    fn test_debug_logger_writes_lines() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path();

        let logger = DebugLogger::new(path).unwrap();
        logger.log_state(StreamState::Streaming, 12, 3);
        logger.log_history_query("rust", true, 2);
        drop(logger);

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "stream_state");
        assert_eq!(first["data"]["fragment_count"], 3);
        assert!(lines[1].contains("\"query\":\"rust\""));
    }

    #[test]
    fn test_render_summary() {
        let pipeline = RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter));
        let source = "Intro\n\n```rust\nfn main() {}\n```";
        let doc = pipeline.render(source);
        let summary = RenderSummary::new(source, &doc);

        assert_eq!(summary.block_count, 1);
        assert_eq!(summary.collapsible_blocks, 0);
        assert_eq!(summary.highlighted_blocks, 1);
        assert_eq!(summary.source_preview, source);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let source = "é".repeat(150);
        let summary = RenderSummary::new(&source, &SafeMarkup::new());
        assert_eq!(summary.source_preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
