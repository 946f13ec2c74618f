//! Syntax highlighting hooks for fenced code blocks.
//!
//! Highlighting is best-effort. The [`CodeBlockPresenter`](crate::present::CodeBlockPresenter)
//! guards every call and falls back to escaped source when a highlighter
//! errors, panics or returns nothing.

use crate::markup::escape_html;
use crate::Result;

#[cfg(feature = "syntect")]
use crate::Error;

/// Produces trusted HTML for a block of source code.
pub trait Highlighter: Send + Sync {
    /// Highlight `code`. `language` is the fence info token, if any.
    fn highlight(&self, code: &str, language: Option<&str>) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "highlighter"
    }
}

/// Escapes the source without adding any styling.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, code: &str, _language: Option<&str>) -> Result<String> {
        Ok(format!("<pre><code>{}</code></pre>", escape_html(code)))
    }

    fn name(&self) -> &str {
        "plain"
    }
}

/// Highlighter backed by syntect's bundled grammars and themes.
///
/// Loading the grammar set takes long enough that hosts should construct it
/// once, off the UI thread, and treat completion as the readiness signal.
#[cfg(feature = "syntect")]
pub struct SyntectHighlighter {
    syntaxes: syntect::parsing::SyntaxSet,
    theme: syntect::highlighting::Theme,
}

#[cfg(feature = "syntect")]
impl SyntectHighlighter {
    pub fn load(theme_name: &str) -> Result<Self> {
        use syntect::highlighting::ThemeSet;
        use syntect::parsing::SyntaxSet;

        let syntaxes = SyntaxSet::load_defaults_newlines();
        let mut themes = ThemeSet::load_defaults();
        let theme = themes.themes.remove(theme_name).ok_or_else(|| {
            Error::config(format!("Unknown highlight theme: {theme_name}"))
        })?;

        tracing::debug!(
            theme = theme_name,
            syntaxes = syntaxes.syntaxes().len(),
            "Loaded syntax highlighter"
        );
        Ok(Self { syntaxes, theme })
    }
}

#[cfg(feature = "syntect")]
impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, language: Option<&str>) -> Result<String> {
        use syntect::html::highlighted_html_for_string;

        let syntax = language
            .filter(|lang| !lang.is_empty())
            .and_then(|lang| self.syntaxes.find_syntax_by_token(lang))
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());

        highlighted_html_for_string(code, &self.syntaxes, syntax, &self.theme)
            .map_err(|e| Error::highlight(e.to_string()))
    }

    fn name(&self) -> &str {
        "syntect"
    }
}
