//! Math typesetting pass over rendered markup.

use crate::markup::{escape_html, unescape_entities, SafeMarkup};
use crate::{Error, Result};

/// A formula delimiter pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    pub open: String,
    pub close: String,
    /// Display (block) formula rather than inline.
    pub display: bool,
}

impl Delimiter {
    pub fn new(open: impl Into<String>, close: impl Into<String>, display: bool) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            display,
        }
    }
}

/// Ordered delimiter table. Earlier entries win when two start at the same offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterConfig {
    pub delimiters: Vec<Delimiter>,
}

impl Default for DelimiterConfig {
    fn default() -> Self {
        Self {
            delimiters: vec![
                Delimiter::new("$$", "$$", true),
                Delimiter::new("\\[", "\\]", true),
                Delimiter::new("\\(", "\\)", false),
                Delimiter::new("$", "$", false),
            ],
        }
    }
}

/// Typesets formulas inside a rendered document.
///
/// Best-effort: the render pipeline runs implementations on a copy of the
/// document and discards the copy if they fail or panic.
pub trait Typesetter: Send + Sync {
    fn typeset(&self, doc: &mut SafeMarkup, delimiters: &DelimiterConfig) -> Result<()>;

    fn name(&self) -> &str {
        "typesetter"
    }
}

/// Wraps each well-formed formula in a `span.math` element carrying its TeX
/// source, for a client-side math engine to pick up.
///
/// Text inside `<code>` and `<pre>` is never touched. Spans that do not parse
/// (unbalanced braces, empty, or `$5 and $`-style currency) stay literal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpanTypesetter;

impl Typesetter for SpanTypesetter {
    fn typeset(&self, doc: &mut SafeMarkup, delimiters: &DelimiterConfig) -> Result<()> {
        for html in doc.markup_mut() {
            *html = typeset_html(html, delimiters)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "span"
    }
}

fn typeset_html(html: &str, delimiters: &DelimiterConfig) -> Result<String> {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let mut code_depth = 0usize;

    while let Some(lt) = rest.find('<') {
        let text = &rest[..lt];
        if code_depth == 0 {
            out.push_str(&typeset_text(text, delimiters));
        } else {
            out.push_str(text);
        }

        let gt = rest[lt..]
            .find('>')
            .ok_or_else(|| Error::typeset("unterminated tag in rendered markup"))?;
        let tag = &rest[lt..lt + gt + 1];
        let name: String = tag[1..]
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name == "code" || name == "pre" {
            if tag.starts_with("</") {
                code_depth = code_depth.saturating_sub(1);
            } else {
                code_depth += 1;
            }
        }
        out.push_str(tag);
        rest = &rest[lt + gt + 1..];
    }

    if code_depth == 0 {
        out.push_str(&typeset_text(rest, delimiters));
    } else {
        out.push_str(rest);
    }
    Ok(out)
}

/// Typeset one escaped text node.
fn typeset_text(text: &str, delimiters: &DelimiterConfig) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while pos < text.len() {
        let next = delimiters
            .delimiters
            .iter()
            .enumerate()
            .filter_map(|(order, d)| text[pos..].find(&d.open).map(|at| (pos + at, order, d)))
            .min_by_key(|(at, order, _)| (*at, *order));

        let Some((start, _, delimiter)) = next else {
            break;
        };
        let body_start = start + delimiter.open.len();
        let close = text[body_start..]
            .find(&delimiter.close)
            .map(|at| body_start + at);

        match close {
            Some(end) if is_formula(&text[body_start..end], delimiter) => {
                out.push_str(&text[pos..start]);
                let tex = unescape_entities(&text[body_start..end]);
                let class = if delimiter.display {
                    "math math-display"
                } else {
                    "math math-inline"
                };
                out.push_str(&format!(
                    "<span class=\"{class}\" data-tex=\"{}\">{}</span>",
                    escape_html(tex.trim()),
                    &text[start..end + delimiter.close.len()]
                ));
                pos = end + delimiter.close.len();
            }
            _ => {
                out.push_str(&text[pos..body_start]);
                pos = body_start;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

fn is_formula(body: &str, delimiter: &Delimiter) -> bool {
    if body.trim().is_empty() {
        return false;
    }
    if delimiter.open == "$" && (body.starts_with(char::is_whitespace) || body.ends_with(char::is_whitespace)) {
        return false;
    }
    braces_balanced(body)
}

fn braces_balanced(body: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typeset(text: &str) -> String {
        typeset_html(text, &DelimiterConfig::default()).unwrap()
    }

    #[test]
    fn test_display_dollars() {
        assert_eq!(
            typeset("<p>$$ x^2 $$</p>"),
            "<p><span class=\"math math-display\" data-tex=\"x^2\">$$ x^2 $$</span></p>"
        );
    }

    #[test]
    fn test_inline_paren() {
        let out = typeset("<p>let \\(a+b\\) be</p>");
        assert!(out.contains("<span class=\"math math-inline\" data-tex=\"a+b\">\\(a+b\\)</span>"));
    }

    #[test]
    fn test_bracket_display() {
        let out = typeset("\\[\\frac{1}{2}\\]");
        assert!(out.contains("math-display"));
        assert!(out.contains("data-tex=\"\\frac{1}{2}\""));
    }

    #[test]
    fn test_double_dollar_wins_over_single() {
        let out = typeset("$$a$$");
        assert_eq!(out.matches("<span").count(), 1);
        assert!(out.contains("math-display"));
    }

    #[test]
    fn test_currency_left_literal() {
        let text = "<p>costs $5 and $10 today</p>";
        assert_eq!(typeset(text), text);
    }

    #[test]
    fn test_unbalanced_braces_left_literal() {
        let text = "<p>\\(\\frac{a}{b\\)</p>";
        assert_eq!(typeset(text), text);
    }

    #[test]
    fn test_unclosed_delimiter_left_literal() {
        let text = "<p>open \\( never closed</p>";
        assert_eq!(typeset(text), text);
    }

    #[test]
    fn test_code_untouched() {
        let text = "<pre><code>$a$ and \\(b\\)</code></pre><p><code>$x$</code></p>";
        assert_eq!(typeset(text), text);
    }

    #[test]
    fn test_entities_decoded_into_tex_attribute() {
        let out = typeset("<p>$a &lt; b$</p>");
        assert!(out.contains("data-tex=\"a &lt; b\""));
        assert!(out.contains(">$a &lt; b$</span>"));
    }

    #[test]
    fn test_broken_markup_is_error() {
        assert!(typeset_html("<p>$a$ <span", &DelimiterConfig::default()).is_err());
    }

    #[test]
    fn test_typesetter_updates_document() {
        use std::sync::Arc;

        use crate::config::RenderConfig;
        use crate::highlight::PlainHighlighter;
        use crate::markup::RichTextRenderer;
        use crate::present::CodeBlockPresenter;

        let renderer = RichTextRenderer::new(
            RenderConfig::default(),
            CodeBlockPresenter::new(Arc::new(PlainHighlighter), 20),
        );
        let mut doc = renderer.render("Euler: \\\\(e^{i\\\\pi}\\\\)\n\n```\n$not math$\n```");
        SpanTypesetter
            .typeset(&mut doc, &DelimiterConfig::default())
            .unwrap();
        let html = doc.to_html();
        assert!(html.contains("data-tex=\"e^{i\\pi}\""));
        assert!(html.contains("$not math$"));
        assert_eq!(html.matches("class=\"math").count(), 1);
    }
}
