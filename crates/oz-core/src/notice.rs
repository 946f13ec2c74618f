//! Clipboard access and transient user notices.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::markup::SafeMarkup;
use crate::Result;

/// Host clipboard.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
    pub expires_at: Instant,
}

/// Auto-dismissing notices, newest last.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    ttl: Duration,
    notices: VecDeque<Notice>,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            notices: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>, level: NoticeLevel, now: Instant) {
        self.notices.push_back(Notice {
            message: message.into(),
            level,
            expires_at: now + self.ttl,
        });
    }

    /// Drop expired notices. Returns whether anything was removed.
    pub fn prune(&mut self, now: Instant) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.expires_at > now);
        self.notices.len() != before
    }

    /// Newest notice still showing at `now`.
    pub fn current(&self, now: Instant) -> Option<&Notice> {
        self.notices.iter().rev().find(|n| n.expires_at > now)
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

/// Copy code block `index` of `doc`, reporting the outcome as a notice.
///
/// Failures are non-fatal; the caller can simply retry.
pub fn copy_block(
    clipboard: &mut dyn Clipboard,
    doc: &SafeMarkup,
    index: usize,
    board: &mut NoticeBoard,
    now: Instant,
) -> bool {
    let result = doc
        .block_copy_text(index)
        .and_then(|text| clipboard.set_text(text));
    report_copy(result, board, now)
}

/// Copy arbitrary text, reporting the outcome as a notice.
pub fn copy_text(
    clipboard: &mut dyn Clipboard,
    text: &str,
    board: &mut NoticeBoard,
    now: Instant,
) -> bool {
    report_copy(clipboard.set_text(text), board, now)
}

fn report_copy(result: Result<()>, board: &mut NoticeBoard, now: Instant) -> bool {
    match result {
        Ok(()) => {
            board.push("Copied to clipboard", NoticeLevel::Info, now);
            true
        }
        Err(e) => {
            warn!(error = %e, "Copy failed");
            board.push(format!("Copy failed: {e}"), NoticeLevel::Error, now);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::RenderConfig;
    use crate::highlight::PlainHighlighter;
    use crate::pipeline::RenderPipeline;
    use crate::testing::{FailingClipboard, MemoryClipboard};

    fn doc() -> SafeMarkup {
        RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter))
            .render("```sh\necho <hi>\n```")
    }

    #[test]
    fn test_copy_block_success() {
        let now = Instant::now();
        let mut clipboard = MemoryClipboard::default();
        let mut board = NoticeBoard::new(Duration::from_secs(2));
        assert!(copy_block(&mut clipboard, &doc(), 0, &mut board, now));
        assert_eq!(clipboard.contents.as_deref(), Some("echo <hi>"));
        assert_eq!(board.current(now).unwrap().level, NoticeLevel::Info);
    }

    #[test]
    fn test_copy_failure_is_transient_notice() {
        let now = Instant::now();
        let mut clipboard = FailingClipboard;
        let mut board = NoticeBoard::new(Duration::from_secs(2));
        assert!(!copy_block(&mut clipboard, &doc(), 0, &mut board, now));
        let notice = board.current(now).unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("Copy failed"));

        let later = now + Duration::from_secs(3);
        assert!(board.current(later).is_none());
        assert!(board.prune(later));
        assert!(board.is_empty());
    }

    #[test]
    fn test_copy_missing_block() {
        let now = Instant::now();
        let mut clipboard = MemoryClipboard::default();
        let mut board = NoticeBoard::new(Duration::from_secs(2));
        assert!(!copy_block(&mut clipboard, &doc(), 9, &mut board, now));
        assert!(clipboard.contents.is_none());
    }

    #[test]
    fn test_copy_text() {
        let now = Instant::now();
        let mut clipboard = MemoryClipboard::default();
        let mut board = NoticeBoard::new(Duration::from_secs(2));
        assert!(copy_text(&mut clipboard, "entry", &mut board, now));
        assert_eq!(clipboard.contents.as_deref(), Some("entry"));
    }
}
