//! Static and collapsible presentation of fenced code blocks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::highlight::Highlighter;
use crate::markup::{escape_html, text_content};

/// Display state of a presented code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Short block: always expanded, never toggles.
    Static,
    Collapsed,
    Expanded,
}

/// A rendered code fence plus its interaction state.
#[derive(Debug, Clone)]
pub struct PresentedBlock {
    language: Option<String>,
    line_count: usize,
    body_html: String,
    copy_text: String,
    highlighted: bool,
    state: BlockState,
}

impl PresentedBlock {
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_collapsible(&self) -> bool {
        self.state != BlockState::Static
    }

    pub fn is_expanded(&self) -> bool {
        self.state != BlockState::Collapsed
    }

    /// False when the highlighter failed and the body is escaped source.
    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    /// Highlighted (or fallback) body markup.
    pub fn body_html(&self) -> &str {
        &self.body_html
    }

    /// Text of the rendered body, exactly as displayed.
    pub fn copy_text(&self) -> &str {
        &self.copy_text
    }

    /// Directional indicator for collapsible blocks.
    pub fn indicator(&self) -> Option<&'static str> {
        match self.state {
            BlockState::Static => None,
            BlockState::Collapsed => Some("▸"),
            BlockState::Expanded => Some("▾"),
        }
    }

    /// Flip between collapsed and expanded. Returns whether anything changed.
    pub fn toggle(&mut self) -> bool {
        self.state = match self.state {
            BlockState::Static => return false,
            BlockState::Collapsed => BlockState::Expanded,
            BlockState::Expanded => BlockState::Collapsed,
        };
        true
    }

    /// Handle a click on the block header.
    ///
    /// A click that ends a text selection must not toggle, so callers pass
    /// the host's current selection.
    pub fn on_click(&mut self, selection: &str) -> bool {
        if !selection.is_empty() {
            return false;
        }
        self.toggle()
    }

    /// HTML for the block at position `index` in its document.
    pub fn to_html(&self, index: usize) -> String {
        let lang_attr = self
            .language
            .as_deref()
            .map(|lang| format!(" data-lang=\"{}\"", escape_html(lang)))
            .unwrap_or_default();
        let lang_label = self
            .language
            .as_deref()
            .map(|lang| format!("<span class=\"code-lang\">{}</span>", escape_html(lang)))
            .unwrap_or_default();
        let copy = format!("<button class=\"code-copy\" data-block=\"{index}\">Copy</button>");

        match self.state {
            BlockState::Static => format!(
                "<div class=\"code-block static\" data-block=\"{index}\"{lang_attr}>\
                 <div class=\"code-header\">{lang_label}{copy}</div>\
                 <div class=\"code-body\">{}</div></div>\n",
                self.body_html
            ),
            state => {
                let class = if state == BlockState::Collapsed {
                    "collapsed"
                } else {
                    "expanded"
                };
                format!(
                    "<div class=\"code-block collapsible {class}\" data-block=\"{index}\"{lang_attr}>\
                     <div class=\"code-header\"><span class=\"code-toggle\">{}</span>{lang_label}\
                     <span class=\"code-lines\">{} lines</span>{copy}</div>\
                     <div class=\"code-body\">{}</div></div>\n",
                    self.indicator().unwrap_or_default(),
                    self.line_count,
                    self.body_html
                )
            }
        }
    }
}

/// Wraps code fences in static or collapsible presentation.
#[derive(Clone)]
pub struct CodeBlockPresenter {
    highlighter: Arc<dyn Highlighter>,
    collapse_threshold: usize,
}

impl CodeBlockPresenter {
    pub fn new(highlighter: Arc<dyn Highlighter>, collapse_threshold: usize) -> Self {
        Self {
            highlighter,
            collapse_threshold,
        }
    }

    pub fn collapse_threshold(&self) -> usize {
        self.collapse_threshold
    }

    pub fn present(&self, language: Option<&str>, raw: &str) -> PresentedBlock {
        let line_count = raw.lines().count();
        let (body_html, highlighted) = match self.guarded_highlight(raw, language) {
            Some(html) => (html, true),
            None => (format!("<pre><code>{}</code></pre>", escape_html(raw)), false),
        };
        let copy_text = visible_code(&body_html);
        let state = if line_count > self.collapse_threshold {
            BlockState::Collapsed
        } else {
            BlockState::Static
        };

        PresentedBlock {
            language: language.map(str::to_string),
            line_count,
            body_html,
            copy_text,
            highlighted,
            state,
        }
    }

    fn guarded_highlight(&self, raw: &str, language: Option<&str>) -> Option<String> {
        let highlighter = &self.highlighter;
        let result = catch_unwind(AssertUnwindSafe(|| highlighter.highlight(raw, language)));
        match result {
            Ok(Ok(html)) if !html.trim().is_empty() || raw.is_empty() => Some(html),
            Ok(Ok(_)) => {
                warn!(
                    highlighter = highlighter.name(),
                    language = language.unwrap_or(""),
                    "Highlighter returned empty output, using plain text"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(
                    highlighter = highlighter.name(),
                    language = language.unwrap_or(""),
                    error = %e,
                    "Highlighting failed, using plain text"
                );
                None
            }
            Err(_) => {
                warn!(
                    highlighter = highlighter.name(),
                    language = language.unwrap_or(""),
                    "Highlighter panicked, using plain text"
                );
                None
            }
        }
    }
}

/// Text a reader sees in a rendered code body.
fn visible_code(body_html: &str) -> String {
    text_content(body_html).trim_end_matches('\n').to_string()
}
