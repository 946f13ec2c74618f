//! Standalone HTML page around a rendered document.
//!
//! The page script mirrors the presenter's interaction rules: a header click
//! toggles a collapsible block unless it ended a text selection, and the copy
//! button copies the visible body text.

use oz_core::SafeMarkup;

const STYLE: &str = r#"
body { font: 15px/1.5 system-ui, sans-serif; margin: 0; background: #1e2127; color: #d7dae0; }
#live { box-sizing: border-box; padding: 12px 16px; overflow-y: auto; transition: height 150ms ease-out; }
a { color: #61afef; }
table { border-collapse: collapse; }
th, td { border: 1px solid #3e4451; padding: 2px 8px; }
code { font-family: ui-monospace, monospace; }
.code-block { border: 1px solid #3e4451; border-radius: 6px; margin: 8px 0; }
.code-header { display: flex; gap: 8px; align-items: center; padding: 2px 8px; background: #282c34; font-size: 12px; }
.collapsible .code-header { cursor: pointer; user-select: none; }
.code-copy { margin-left: auto; }
.code-body pre { margin: 0; padding: 8px; overflow-x: auto; }
.code-block.collapsed .code-body { display: none; }
.math { font-style: italic; color: #56b6c2; }
.status { padding: 4px 16px; font-size: 12px; color: #7f848e; }
.status.error { color: #e06c75; }
"#;

const SCRIPT: &str = r#"
document.addEventListener('click', function (event) {
  var copy = event.target.closest('.code-copy');
  if (copy) {
    var body = copy.closest('.code-block').querySelector('.code-body');
    navigator.clipboard.writeText(body.innerText.replace(/\n+$/, ''));
    return;
  }
  var header = event.target.closest('.collapsible .code-header');
  if (!header || String(window.getSelection())) return;
  var block = header.parentElement;
  var expanded = block.classList.toggle('expanded');
  block.classList.toggle('collapsed', !expanded);
  header.querySelector('.code-toggle').textContent = expanded ? '▾' : '▸';
});
"#;

/// Final state line shown under the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    Streaming,
    Complete,
    Failed(String),
}

/// Wrap `doc` in a complete HTML page.
pub fn render_page(doc: &SafeMarkup, height: Option<u32>, status: Option<&PageStatus>) -> String {
    let height_style = height
        .map(|h| format!(" style=\"height:{h}px\""))
        .unwrap_or_default();
    let status_line = match status {
        None => String::new(),
        Some(PageStatus::Streaming) => "<div class=\"status\">Generating…</div>\n".to_string(),
        Some(PageStatus::Complete) => "<div class=\"status\">Done</div>\n".to_string(),
        Some(PageStatus::Failed(message)) => format!(
            "<div class=\"status error\">Error: {}</div>\n",
            escape_text(message)
        ),
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>oz</title>\n\
         <style>{STYLE}</style>\n</head>\n<body>\n<div id=\"live\"{height_style}>\n{}</div>\n\
         {status_line}<script>{SCRIPT}</script>\n</body>\n</html>\n",
        doc.to_html()
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use oz_core::{PlainHighlighter, RenderConfig, RenderPipeline};

    #[test]
    fn test_page_wraps_document() {
        let doc = RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter))
            .render("**hi**");
        let page = render_page(&doc, Some(240), None);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<div id=\"live\" style=\"height:240px\">"));
        assert!(page.contains("<strong>hi</strong>"));
        assert!(!page.contains("class=\"status"));
    }

    #[test]
    fn test_failure_message_escaped() {
        let page = render_page(
            &SafeMarkup::new(),
            None,
            Some(&PageStatus::Failed("<boom>".into())),
        );
        assert!(page.contains("Error: &lt;boom&gt;"));
    }
}
