//! Test doubles shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::highlight::Highlighter;
use crate::history::{EntryId, HistoryEntry, PersistenceSource};
use crate::markup::SafeMarkup;
use crate::math::{DelimiterConfig, Typesetter};
use crate::notice::Clipboard;
use crate::paginate::{EmptyState, ListSurface, RenderedEntry};
use crate::stream::{LiveSurface, Scheduler, TickHandle};
use crate::Result;

/// Scheduler that records requests; tests fire ticks by hand.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    scheduled: Vec<(TickHandle, Duration)>,
    cancelled: Vec<TickHandle>,
}

impl ManualScheduler {
    pub fn scheduled(&self) -> &[(TickHandle, Duration)] {
        &self.scheduled
    }

    pub fn cancelled(&self) -> &[TickHandle] {
        &self.cancelled
    }

    /// Handles scheduled and not yet cancelled.
    pub fn active(&self) -> Vec<TickHandle> {
        self.scheduled
            .iter()
            .map(|(handle, _)| *handle)
            .filter(|handle| !self.cancelled.contains(handle))
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_every(&mut self, interval: Duration) -> TickHandle {
        self.next_id += 1;
        let handle = TickHandle(self.next_id);
        self.scheduled.push((handle, interval));
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        self.cancelled.push(handle);
    }
}

/// Live surface that records plain text of each replacement.
///
/// Height is reported as 20 units per rendered line.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub replaced: Vec<String>,
    pub resizes: Vec<u32>,
    pub completed: usize,
    pub failures: Vec<String>,
    pub clears: usize,
}

impl LiveSurface for RecordingSurface {
    fn replace(&mut self, doc: &SafeMarkup) -> u32 {
        let text = doc.plain_text();
        let lines = text.lines().count().max(1) as u32;
        self.replaced.push(text);
        lines * 20
    }

    fn resize(&mut self, height: u32) {
        self.resizes.push(height);
    }

    fn complete(&mut self) {
        self.completed += 1;
    }

    fn fail(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    Clear,
    Empty(EmptyState),
    Append(EntryId),
}

/// List surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingListSurface {
    pub events: Vec<ListEvent>,
    rendered: Vec<RenderedEntry>,
}

impl RecordingListSurface {
    pub fn appended(&self) -> usize {
        self.rendered.len()
    }

    pub fn clears(&self) -> usize {
        self.events.iter().filter(|e| **e == ListEvent::Clear).count()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.rendered.iter()
    }

    /// Entries appended after the most recent clear.
    pub fn since_last_clear(&self) -> impl Iterator<Item = &RenderedEntry> {
        let appended_before = self
            .events
            .iter()
            .rposition(|e| *e == ListEvent::Clear)
            .map(|at| {
                self.events[..at]
                    .iter()
                    .filter(|e| matches!(e, ListEvent::Append(_)))
                    .count()
            })
            .unwrap_or(0);
        self.rendered.iter().skip(appended_before)
    }
}

impl ListSurface for RecordingListSurface {
    fn show_empty(&mut self, state: EmptyState) {
        self.events.push(ListEvent::Empty(state));
    }

    fn clear(&mut self) {
        self.events.push(ListEvent::Clear);
    }

    fn append(&mut self, entry: RenderedEntry) {
        self.events.push(ListEvent::Append(entry.id.clone()));
        self.rendered.push(entry);
    }
}

/// Highlighter that always errors.
pub struct FailingHighlighter;

impl Highlighter for FailingHighlighter {
    fn highlight(&self, _code: &str, _language: Option<&str>) -> Result<String> {
        Err(Error::highlight("highlighter unavailable"))
    }
}

/// Highlighter that panics.
pub struct PanickingHighlighter;

impl Highlighter for PanickingHighlighter {
    fn highlight(&self, _code: &str, _language: Option<&str>) -> Result<String> {
        panic!("highlighter exploded")
    }
}

/// Highlighter that returns nothing.
pub struct EmptyHighlighter;

impl Highlighter for EmptyHighlighter {
    fn highlight(&self, _code: &str, _language: Option<&str>) -> Result<String> {
        Ok(String::new())
    }
}

/// Typesetter that errors after scribbling on the document.
pub struct FailingTypesetter;

impl Typesetter for FailingTypesetter {
    fn typeset(&self, doc: &mut SafeMarkup, _delimiters: &DelimiterConfig) -> Result<()> {
        for html in doc.markup_mut() {
            html.push_str("<span class=\"math broken\">");
        }
        Err(Error::typeset("parse error"))
    }
}

/// Typesetter that panics.
pub struct PanickingTypesetter;

impl Typesetter for PanickingTypesetter {
    fn typeset(&self, _doc: &mut SafeMarkup, _delimiters: &DelimiterConfig) -> Result<()> {
        panic!("typesetter exploded")
    }
}

/// In-memory persistence with switchable failure modes.
pub struct MemoryPersistence {
    entries: Mutex<Vec<HistoryEntry>>,
    fail_load: bool,
    refuse_clear: bool,
}

impl MemoryPersistence {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_load: false,
            refuse_clear: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn refusing_clear(mut self) -> Self {
        self.refuse_clear = true;
        self
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSource for MemoryPersistence {
    async fn load(&self) -> Result<Vec<HistoryEntry>> {
        if self.fail_load {
            return Err(Error::persistence("store unavailable"));
        }
        Ok(self.entries())
    }

    async fn clear_all(&self) -> Result<bool> {
        if self.refuse_clear {
            return Ok(false);
        }
        self.entries.lock().unwrap().clear();
        Ok(true)
    }
}

/// Clipboard that stores the last copied text.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}

/// Clipboard that rejects every write.
pub struct FailingClipboard;

impl Clipboard for FailingClipboard {
    fn set_text(&mut self, _text: &str) -> Result<()> {
        Err(Error::clipboard("clipboard is locked"))
    }
}
