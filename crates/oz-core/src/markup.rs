//! Markdown to safe HTML.
//!
//! [`RichTextRenderer`] walks pulldown-cmark events and produces a
//! [`SafeMarkup`] document. Raw HTML in the input is re-emitted as escaped
//! text, links with script-capable schemes lose their target, and fenced code
//! is handed to the [`CodeBlockPresenter`] so blocks stay individually
//! addressable for toggling and copying.

use std::borrow::Cow;
use std::sync::LazyLock;

use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use pulldown_cmark_escape::FmtWriter;
use regex::{Captures, Regex};
use tracing::trace;

use crate::config::RenderConfig;
use crate::present::{CodeBlockPresenter, PresentedBlock};
use crate::{Error, Result};

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"'`]+"#).expect("url pattern")
});

// Code spans and dollar math come first and are kept as they are.
static PAREN_MATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(\$\$.+?\$\$|`[^`]*`)|\\{1,2}\([^`\n]+?\\{1,2}\)")
        .expect("paren math pattern")
});

const SHIELD_OPEN: char = '\u{E000}';
const SHIELD_CLOSE: char = '\u{E001}';

/// `\(...\)` formulas swapped for placeholders while markdown is parsed, so
/// emphasis and smart punctuation never see their contents.
#[derive(Debug, Default)]
struct MathShield {
    spans: Vec<String>,
}

impl MathShield {
    fn apply(source: &str) -> (Cow<'_, str>, Self) {
        let mut shield = Self::default();
        if source.contains(SHIELD_OPEN) {
            return (Cow::Borrowed(source), shield);
        }
        let text = PAREN_MATH.replace_all(source, |caps: &Captures| {
            if caps.get(1).is_some() {
                return caps[0].to_string();
            }
            shield.spans.push(caps[0].to_string());
            format!("{SHIELD_OPEN}{}{SHIELD_CLOSE}", shield.spans.len() - 1)
        });
        (text, shield)
    }

    /// Put the formulas back. Outside code the doubled backslashes collapse
    /// the way markdown escapes would have.
    fn restore<'a>(&self, text: CowStr<'a>, in_code: bool) -> CowStr<'a> {
        if !text.contains(SHIELD_OPEN) {
            return text;
        }
        let mut out = String::with_capacity(text.len());
        let mut rest: &str = &text;
        while let Some(open) = rest.find(SHIELD_OPEN) {
            out.push_str(&rest[..open]);
            let after = &rest[open + SHIELD_OPEN.len_utf8()..];
            let found = after.find(SHIELD_CLOSE).and_then(|close| {
                let index: usize = after[..close].parse().ok()?;
                self.spans.get(index).map(|span| (span, close))
            });
            match found {
                Some((span, close)) => {
                    if in_code {
                        out.push_str(span);
                    } else {
                        out.push_str(&span.replace("\\\\", "\\"));
                    }
                    rest = &after[close + SHIELD_CLOSE.len_utf8()..];
                }
                None => {
                    out.push(SHIELD_OPEN);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out.into()
    }

    fn restore_event<'a>(&self, event: Event<'a>, in_code: bool) -> Event<'a> {
        if self.spans.is_empty() {
            return event;
        }
        match event {
            Event::Text(text) => Event::Text(self.restore(text, in_code)),
            Event::Code(text) => Event::Code(self.restore(text, true)),
            Event::Html(text) => Event::Html(self.restore(text, true)),
            Event::InlineHtml(text) => Event::InlineHtml(self.restore(text, true)),
            Event::InlineMath(text) => Event::InlineMath(self.restore(text, true)),
            Event::DisplayMath(text) => Event::DisplayMath(self.restore(text, true)),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Link {
                link_type,
                dest_url: self.restore(dest_url, true),
                title: self.restore(title, true),
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Image {
                link_type,
                dest_url: self.restore(dest_url, true),
                title: self.restore(title, true),
                id,
            }),
            other => other,
        }
    }
}

/// One piece of a rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Renderer-produced HTML.
    Markup(String),
    /// Index into [`SafeMarkup::blocks`].
    Block(usize),
}

/// Rendered output whose HTML structure was produced entirely by the renderer.
#[derive(Debug, Clone, Default)]
pub struct SafeMarkup {
    segments: Vec<Segment>,
    blocks: Vec<PresentedBlock>,
}

impl SafeMarkup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn blocks(&self) -> &[PresentedBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&PresentedBlock> {
        self.blocks.get(index)
    }

    pub(crate) fn push_markup(&mut self, html: String) {
        if html.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Markup(prev)) => prev.push_str(&html),
            _ => self.segments.push(Segment::Markup(html)),
        }
    }

    pub(crate) fn push_block(&mut self, block: PresentedBlock) {
        self.segments.push(Segment::Block(self.blocks.len()));
        self.blocks.push(block);
    }

    /// Mutable access to every markup segment, for post-processing passes.
    pub(crate) fn markup_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.segments.iter_mut().filter_map(|segment| match segment {
            Segment::Markup(html) => Some(html),
            Segment::Block(_) => None,
        })
    }

    /// Forward a click on block `index`. Returns whether the block toggled.
    pub fn click_block(&mut self, index: usize, selection: &str) -> Result<bool> {
        self.blocks
            .get_mut(index)
            .map(|block| block.on_click(selection))
            .ok_or(Error::BlockNotFound(index))
    }

    /// Text a copy action on block `index` places on the clipboard.
    pub fn block_copy_text(&self, index: usize) -> Result<&str> {
        self.blocks
            .get(index)
            .map(PresentedBlock::copy_text)
            .ok_or(Error::BlockNotFound(index))
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Markup(html) => out.push_str(html),
                Segment::Block(index) => {
                    if let Some(block) = self.blocks.get(*index) {
                        out.push_str(&block.to_html(*index));
                    }
                }
            }
        }
        out
    }

    /// Readable text of the whole document with code blocks expanded.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Markup(html) => out.push_str(&text_content(html)),
                Segment::Block(index) => {
                    if let Some(block) = self.blocks.get(*index) {
                        out.push_str(block.copy_text());
                        out.push('\n');
                    }
                }
            }
        }
        out.lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    }
}

/// Markdown renderer with code fences delegated to a presenter.
#[derive(Clone)]
pub struct RichTextRenderer {
    config: RenderConfig,
    presenter: CodeBlockPresenter,
}

impl RichTextRenderer {
    pub fn new(config: RenderConfig, presenter: CodeBlockPresenter) -> Self {
        Self { config, presenter }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn options(&self) -> Options {
        let mut options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_MATH;
        if self.config.smart_punctuation {
            options |= Options::ENABLE_SMART_PUNCTUATION;
        }
        options
    }

    /// Render already-normalized markdown.
    pub fn render(&self, normalized: &str) -> SafeMarkup {
        let mut doc = SafeMarkup::new();
        let mut run: Vec<Event<'_>> = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;
        // One entry per open link or image; `true` when its target was dropped.
        let mut suppressed: Vec<bool> = Vec::new();
        let mut link_depth = 0usize;
        let (source, shield) = MathShield::apply(normalized);

        for event in TextMergeStream::new(Parser::new_ext(&source, self.options())) {
            let event = shield.restore_event(event, code.is_some());
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => fence_language(&info),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((language, String::new()));
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((language, body)) = code.take() {
                        flush(&mut doc, &mut run);
                        doc.push_block(self.presenter.present(language.as_deref(), &body));
                    }
                }
                Event::Html(raw) | Event::InlineHtml(raw) => run.push(Event::Text(raw)),
                Event::SoftBreak if self.config.hard_breaks => run.push(Event::HardBreak),
                Event::InlineMath(tex) => run.push(Event::Text(format!("${tex}$").into())),
                Event::DisplayMath(tex) => {
                    // Backslashes were doubled ahead of markdown escaping, which
                    // math spans skip.
                    let tex = tex.replace("\\\\", "\\");
                    run.push(Event::Text(format!("$${tex}$$").into()));
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let safe = is_safe_url(&dest_url);
                    suppressed.push(!safe);
                    link_depth += 1;
                    if safe {
                        run.push(Event::Start(Tag::Link {
                            link_type,
                            dest_url,
                            title,
                            id,
                        }));
                    } else {
                        trace!(url = %dest_url, "Dropped unsafe link target");
                    }
                }
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let safe = is_safe_url(&dest_url);
                    suppressed.push(!safe);
                    if safe {
                        run.push(Event::Start(Tag::Image {
                            link_type,
                            dest_url,
                            title,
                            id,
                        }));
                    }
                }
                Event::End(end @ (TagEnd::Link | TagEnd::Image)) => {
                    if end == TagEnd::Link {
                        link_depth = link_depth.saturating_sub(1);
                    }
                    if !suppressed.pop().unwrap_or(false) {
                        run.push(Event::End(end));
                    }
                }
                Event::Text(text) if self.config.autolink && link_depth == 0 => {
                    autolink(text, &mut run);
                }
                other => run.push(other),
            }
        }

        // An unterminated fence still yields its content.
        if let Some((language, body)) = code.take() {
            flush(&mut doc, &mut run);
            doc.push_block(self.presenter.present(language.as_deref(), &body));
        }
        flush(&mut doc, &mut run);

        trace!(
            bytes = normalized.len(),
            segments = doc.segments.len(),
            blocks = doc.blocks.len(),
            "Rendered markup"
        );
        doc
    }
}

fn flush(doc: &mut SafeMarkup, run: &mut Vec<Event<'_>>) {
    if run.is_empty() {
        return;
    }
    let mut out = String::new();
    html::push_html(&mut out, run.drain(..));
    doc.push_markup(out);
}

/// First token of a fence info string (`rust,no_run` -> `rust`).
fn fence_language(info: &str) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Only web and mail targets (or relative references) may become links.
pub fn is_safe_url(url: &str) -> bool {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme_end = cleaned.find(':');
    let path_start = cleaned.find(|c| matches!(c, '/' | '?' | '#'));
    match (scheme_end, path_start) {
        (Some(colon), Some(path)) if path < colon => true,
        (Some(colon), _) => matches!(&cleaned[..colon], "http" | "https" | "mailto"),
        (None, _) => true,
    }
}

/// Split a text event around bare URLs.
fn autolink<'a>(text: CowStr<'a>, run: &mut Vec<Event<'a>>) {
    let mut last = 0;
    let mut found = false;
    for m in BARE_URL.find_iter(&text) {
        let url = trim_url(m.as_str());
        if url.is_empty() {
            continue;
        }
        found = true;
        if m.start() > last {
            run.push(Event::Text(text[last..m.start()].to_string().into()));
        }
        let href = if url.to_ascii_lowercase().starts_with("www.") {
            format!("https://{url}")
        } else {
            url.to_string()
        };
        run.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: href.into(),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        run.push(Event::Text(url.to_string().into()));
        run.push(Event::End(TagEnd::Link));
        last = m.start() + url.len();
    }
    if !found {
        run.push(Event::Text(text));
    } else if last < text.len() {
        run.push(Event::Text(text[last..].to_string().into()));
    }
}

/// Drop sentence punctuation and unbalanced closing brackets from a URL match.
fn trim_url(url: &str) -> &str {
    let mut end = url.len();
    loop {
        let candidate = &url[..end];
        let Some(last) = candidate.chars().last() else {
            return candidate;
        };
        let drop = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '*' | '_' | '~' => true,
            ')' => candidate.matches(')').count() > candidate.matches('(').count(),
            ']' => candidate.matches(']').count() > candidate.matches('[').count(),
            _ => false,
        };
        if !drop {
            return candidate;
        }
        end -= last.len_utf8();
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = pulldown_cmark_escape::escape_html(FmtWriter(&mut out), text);
    out
}

/// Decode the named and numeric character references the renderer emits.
pub fn unescape_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let name = &tail[1..end];
            let c = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Visible text of an HTML fragment.
///
/// Tags are dropped, entities decoded, `<br>` becomes a newline, table cells
/// are tab separated and list items get a bullet. A newline directly after a
/// `<pre>` start tag or a `<br>` is not displayed by browsers and is skipped
/// here too.
pub(crate) fn text_content(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        out.push_str(&unescape_entities(&rest[..lt]));
        let Some(gt) = rest[lt..].find('>') else {
            out.push_str(&unescape_entities(&rest[lt..]));
            return out;
        };
        let tag = &rest[lt + 1..lt + gt];
        rest = &rest[lt + gt + 1..];

        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let closing = tag.starts_with('/');
        match (name.as_str(), closing) {
            ("br", _) => {
                out.push('\n');
                rest = rest.strip_prefix('\n').unwrap_or(rest);
            }
            ("td" | "th", true) => out.push('\t'),
            ("li", false) => out.push_str("• "),
            ("pre", false) => {
                if let Some(stripped) = rest.strip_prefix('\n') {
                    rest = stripped;
                }
            }
            _ => {}
        }
    }
    out.push_str(&unescape_entities(rest));
    out
}
