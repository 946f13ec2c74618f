//! Normalize, render and typeset in one call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::highlight::Highlighter;
use crate::markup::{RichTextRenderer, SafeMarkup};
use crate::math::{DelimiterConfig, SpanTypesetter, Typesetter};
use crate::normalize::normalize;
use crate::present::CodeBlockPresenter;

/// The shared rendering path for live streams and history entries.
#[derive(Clone)]
pub struct RenderPipeline {
    renderer: RichTextRenderer,
    typesetter: Arc<dyn Typesetter>,
    delimiters: DelimiterConfig,
}

impl RenderPipeline {
    pub fn new(config: RenderConfig, highlighter: Arc<dyn Highlighter>) -> Self {
        let presenter = CodeBlockPresenter::new(highlighter, config.collapse_threshold_lines);
        Self {
            renderer: RichTextRenderer::new(config, presenter),
            typesetter: Arc::new(SpanTypesetter),
            delimiters: DelimiterConfig::default(),
        }
    }

    pub fn with_typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.typesetter = typesetter;
        self
    }

    pub fn with_delimiters(mut self, delimiters: DelimiterConfig) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn renderer(&self) -> &RichTextRenderer {
        &self.renderer
    }

    /// Render raw model text. Never fails; hook failures degrade to plain output.
    pub fn render(&self, raw: &str) -> SafeMarkup {
        let normalized = normalize(raw);
        let doc = self.renderer.render(&normalized);
        let doc = self.typeset(doc);
        debug!(
            raw_bytes = raw.len(),
            normalized_bytes = normalized.len(),
            blocks = doc.blocks().len(),
            "Render pass"
        );
        doc
    }

    /// Run the typesetter on a copy and keep it only if the pass succeeds.
    fn typeset(&self, doc: SafeMarkup) -> SafeMarkup {
        let mut candidate = doc.clone();
        let typesetter = &self.typesetter;
        let delimiters = &self.delimiters;
        let result = catch_unwind(AssertUnwindSafe(|| {
            typesetter.typeset(&mut candidate, delimiters)
        }));
        match result {
            Ok(Ok(())) => candidate,
            Ok(Err(e)) => {
                warn!(typesetter = typesetter.name(), error = %e, "Typesetting failed, keeping plain markup");
                doc
            }
            Err(_) => {
                warn!(typesetter = typesetter.name(), "Typesetter panicked, keeping plain markup");
                doc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::PlainHighlighter;
    use crate::testing::{FailingHighlighter, FailingTypesetter, PanickingTypesetter};

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter))
    }

    #[test]
    fn test_math_survives_markdown() {
        let doc = pipeline().render("Area: \\(\\pi r^2\\) and \\[ x^2 \n + 1 \\]");
        let html = doc.to_html();
        assert!(html.contains("data-tex=\"\\pi r^2\""));
        assert!(html.contains("math-display"));
        assert!(html.contains("data-tex=\"x^2   + 1\""));
    }

    #[test]
    fn test_repaired_table_renders() {
        let html = pipeline().render("| a | b |\n| 1 | 2 |").to_html();
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>a</th>"));
    }

    #[test]
    fn test_failing_highlighter_still_shows_code() {
        let pipeline = RenderPipeline::new(RenderConfig::default(), Arc::new(FailingHighlighter));
        let doc = pipeline.render("```rust\nlet s = \"<b>\";\n```");
        assert!(doc.to_html().contains("&lt;b&gt;"));
        assert_eq!(doc.blocks()[0].copy_text(), "let s = \"<b>\";");
    }

    #[test]
    fn test_failing_typesetter_keeps_markup() {
        let doc = pipeline()
            .with_typesetter(Arc::new(FailingTypesetter))
            .render("value \\(x\\)");
        assert!(doc.plain_text().contains("\\(x\\)"));
        assert!(!doc.to_html().contains("class=\"math"));
    }

    #[test]
    fn test_panicking_typesetter_keeps_markup() {
        let doc = pipeline()
            .with_typesetter(Arc::new(PanickingTypesetter))
            .render("value $$x$$");
        assert_eq!(doc.plain_text(), "value $$x$$");
    }

    #[test]
    fn test_fragment_order_preserved() {
        let fragments = ["Hel", "lo wor", "ld, this ", "is a te", "st\n\nSecond par", "agraph"];
        let doc = pipeline().render(&fragments.concat());
        assert_eq!(doc.plain_text(), "Hello world, this is a test\nSecond paragraph");
    }
}
