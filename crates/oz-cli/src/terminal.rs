//! Terminal rendering of rendered documents.
//!
//! Walks the HTML that `oz-core` produced and builds ratatui `Text` directly.
//! The TUI path uses `Text` as-is; the CLI path converts via [`text_to_ansi`].
//! Code blocks come from the document's presented blocks, so collapsed blocks
//! show only their header here too.

use oz_core::markup::unescape_entities;
use oz_core::{PresentedBlock, SafeMarkup, Segment};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use unicode_width::UnicodeWidthChar;

/// Style definitions for rendered elements.
struct TerminalStyle {
    bold: Style,
    italic: Style,
    inline_code: Style,
    code_block: Style,
    code_header: Style,
    code_focused: Style,
    gutter: Style,
    h1: Style,
    h2: Style,
    h3: Style,
    h4_h6: Style,
    bullet: Style,
    blockquote: Style,
    link: Style,
    strikethrough: Style,
    math: Style,
    rule: Style,
}

impl Default for TerminalStyle {
    fn default() -> Self {
        Self {
            bold: Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            italic: Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::ITALIC),
            inline_code: Style::default().fg(Color::Yellow),
            code_block: Style::default().fg(Color::Yellow),
            code_header: Style::default().fg(Color::Cyan),
            code_focused: Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            gutter: Style::default().fg(Color::DarkGray),
            h1: Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
            h2: Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
            h3: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            h4_h6: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::ITALIC),
            bullet: Style::default().fg(Color::Cyan),
            blockquote: Style::default().fg(Color::DarkGray),
            link: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::UNDERLINED),
            strikethrough: Style::default().add_modifier(Modifier::CROSSED_OUT),
            math: Style::default()
                .fg(Color::LightCyan)
                .add_modifier(Modifier::ITALIC),
            rule: Style::default().fg(Color::DarkGray),
        }
    }
}

/// Render `doc` to ratatui `Text`.
///
/// `width` bounds horizontal rules; `focused` highlights one code block header.
pub fn markup_to_text(doc: &SafeMarkup, width: usize, focused: Option<usize>) -> Text<'static> {
    let styles = TerminalStyle::default();
    let mut lines: Vec<Line<'static>> = Vec::new();

    for segment in doc.segments() {
        match segment {
            Segment::Markup(html) => {
                let mut walker = HtmlWalker::new(&styles, width);
                walker.walk(html);
                lines.extend(walker.finish());
            }
            Segment::Block(index) => {
                if let Some(block) = doc.block(*index) {
                    render_block(block, focused == Some(*index), &styles, width, &mut lines);
                }
            }
        }
    }

    while lines.last().is_some_and(|line| line.width() == 0) {
        lines.pop();
    }
    Text::from(lines)
}

/// Rows `text` occupies when wrapped at `width` columns.
pub fn wrapped_height(text: &Text, width: usize) -> usize {
    let width = width.max(1);
    text.lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum()
}

/// Split lines wider than `width` into rows at character boundaries.
///
/// Styles carry over to the continuation rows.
pub fn wrap_rows(text: Text<'static>, width: usize) -> Text<'static> {
    let width = width.max(1);
    let mut rows: Vec<Line<'static>> = Vec::new();
    for line in text.lines {
        if line.width() <= width {
            rows.push(line);
            continue;
        }
        let mut row: Vec<Span<'static>> = Vec::new();
        let mut used = 0;
        for span in line.spans {
            let mut chunk = String::new();
            for ch in span.content.chars() {
                let w = ch.width().unwrap_or(0);
                if used + w > width && used > 0 {
                    if !chunk.is_empty() {
                        row.push(Span::styled(std::mem::take(&mut chunk), span.style));
                    }
                    rows.push(Line::from(std::mem::take(&mut row)));
                    used = 0;
                }
                chunk.push(ch);
                used += w;
            }
            if !chunk.is_empty() {
                row.push(Span::styled(chunk, span.style));
            }
        }
        if !row.is_empty() {
            rows.push(Line::from(row));
        }
    }
    Text::from(rows)
}

fn render_block(
    block: &PresentedBlock,
    focused: bool,
    styles: &TerminalStyle,
    width: usize,
    lines: &mut Vec<Line<'static>>,
) {
    let header_style = if focused {
        styles.code_focused
    } else {
        styles.code_header
    };

    let mut header = String::new();
    if let Some(indicator) = block.indicator() {
        header.push_str(indicator);
        header.push(' ');
    }
    header.push_str(block.language().unwrap_or("code"));
    if block.is_collapsible() {
        header.push_str(&format!(" · {} lines", block.line_count()));
    }
    lines.push(Line::from(vec![
        Span::styled("╭ ", styles.gutter),
        Span::styled(header, header_style),
    ]));

    if block.is_expanded() {
        let mut walker = HtmlWalker::new(styles, width);
        walker.walk(block.body_html());
        let mut body = walker.finish();
        while body.last().is_some_and(|line| line.width() == 0) {
            body.pop();
        }
        for line in body {
            let mut spans = vec![Span::styled("│ ", styles.gutter)];
            spans.extend(line.spans);
            lines.push(Line::from(spans));
        }
    }
    lines.push(Line::from(Span::styled("╰", styles.gutter)));
    lines.push(Line::default());
}

/// Event-driven walk over renderer HTML.
struct HtmlWalker<'s> {
    styles: &'s TerminalStyle,
    width: usize,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    style_stack: Vec<Style>,
    /// One entry per open list: `None` for bullets, `Some(next)` for numbers.
    list_stack: Vec<Option<u64>>,
    quote_depth: usize,
    in_pre: bool,
    cell_index: usize,
}

impl<'s> HtmlWalker<'s> {
    fn new(styles: &'s TerminalStyle, width: usize) -> Self {
        Self {
            styles,
            width,
            lines: Vec::new(),
            spans: Vec::new(),
            style_stack: Vec::new(),
            list_stack: Vec::new(),
            quote_depth: 0,
            in_pre: false,
            cell_index: 0,
        }
    }

    fn walk(&mut self, html: &str) {
        let mut rest = html;
        while let Some(lt) = rest.find('<') {
            self.text(&unescape_entities(&rest[..lt]));
            let Some(gt) = rest[lt..].find('>') else {
                self.text(&unescape_entities(&rest[lt..]));
                return;
            };
            let tag = &rest[lt + 1..lt + gt];
            rest = &rest[lt + gt + 1..];
            if self.tag(tag) {
                // A newline directly after <pre> is not content.
                rest = rest.strip_prefix('\n').unwrap_or(rest);
            }
        }
        self.text(&unescape_entities(rest));
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        self.lines
    }

    /// Handle one tag. Returns true when it opened a `<pre>`.
    fn tag(&mut self, tag: &str) -> bool {
        if tag.starts_with('!') {
            return false;
        }
        let closing = tag.starts_with('/');
        let name = tag_name(tag);

        match (name.as_str(), closing) {
            ("p", false) => self.flush(),
            ("p", true) => self.blank(),
            ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", false) => {
                self.flush();
                let style = match name.as_str() {
                    "h1" => self.styles.h1,
                    "h2" => self.styles.h2,
                    "h3" => self.styles.h3,
                    _ => self.styles.h4_h6,
                };
                self.style_stack.push(style);
            }
            ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", true) => {
                self.style_stack.pop();
                self.blank();
            }
            ("strong" | "b", false) => self.style_stack.push(self.styles.bold),
            ("em" | "i", false) => self.style_stack.push(self.styles.italic),
            ("del" | "s", false) => self.style_stack.push(self.styles.strikethrough),
            ("a", false) => self.style_stack.push(self.styles.link),
            ("code", false) if !self.in_pre => self.style_stack.push(self.styles.inline_code),
            ("span", false) => {
                let style = span_style(tag, self.styles);
                self.style_stack.push(style);
            }
            ("strong" | "b" | "em" | "i" | "del" | "s" | "a" | "span", true) => {
                self.style_stack.pop();
            }
            ("code", true) if !self.in_pre => {
                self.style_stack.pop();
            }
            ("br", _) => self.newline(),
            ("ul", false) => {
                self.flush();
                self.list_stack.push(None);
            }
            ("ol", false) => {
                self.flush();
                let start = attr(tag, "start").and_then(|s| s.parse().ok()).unwrap_or(1);
                self.list_stack.push(Some(start));
            }
            ("ul" | "ol", true) => {
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank();
                } else {
                    self.flush();
                }
            }
            ("li", false) => {
                self.flush();
                self.list_item_prefix();
            }
            ("li", true) => self.flush(),
            ("blockquote", false) => {
                self.flush();
                self.quote_depth += 1;
            }
            ("blockquote", true) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            ("pre", false) => {
                self.flush();
                self.in_pre = true;
                self.style_stack.push(self.styles.code_block);
                return true;
            }
            ("pre", true) => {
                self.flush();
                self.in_pre = false;
                self.style_stack.pop();
                self.blank();
            }
            ("hr", _) => {
                self.flush();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(self.width.clamp(3, 80)),
                    self.styles.rule,
                )));
                self.blank();
            }
            ("table", true) => self.blank(),
            ("tr", false) => {
                self.flush();
                self.cell_index = 0;
            }
            ("tr", true) => self.flush(),
            ("th" | "td", false) => {
                self.line_prefix();
                if self.cell_index > 0 {
                    self.spans.push(Span::styled(" │ ", self.styles.rule));
                }
                self.cell_index += 1;
                let style = if name == "th" {
                    self.styles.bold
                } else {
                    Style::default()
                };
                self.style_stack.push(style);
            }
            ("th" | "td", true) => {
                self.style_stack.pop();
            }
            ("input", _) => {
                let mark = if has_flag(tag, "checked") { "[x] " } else { "[ ] " };
                self.line_prefix();
                self.spans.push(Span::styled(mark, self.styles.bullet));
            }
            ("img", _) => {
                let alt = attr(tag, "alt").unwrap_or_default();
                self.line_prefix();
                self.spans
                    .push(Span::styled(format!("[image: {alt}]"), self.styles.link));
            }
            _ => {}
        }
        false
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.in_pre {
            for (i, piece) in text.split('\n').enumerate() {
                if i > 0 {
                    self.newline();
                }
                if !piece.is_empty() {
                    self.push_text(piece.to_string());
                }
            }
            return;
        }

        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let leading = text.starts_with(char::is_whitespace);
        let trailing = text.ends_with(char::is_whitespace);
        let at_line_start = self.spans.iter().all(|s| s.content.trim().is_empty());

        let mut piece = String::new();
        if leading && !at_line_start {
            piece.push(' ');
        }
        piece.push_str(&collapsed);
        if trailing && !collapsed.is_empty() {
            piece.push(' ');
        }
        if piece.trim().is_empty() && at_line_start {
            return;
        }
        self.push_text(piece);
    }

    fn push_text(&mut self, text: String) {
        self.line_prefix();
        let style = effective_style(&self.style_stack);
        self.spans.push(Span::styled(text, style));
    }

    /// Blockquote bars at the start of a line.
    fn line_prefix(&mut self) {
        if self.spans.is_empty() && self.quote_depth > 0 {
            self.spans
                .push(Span::styled("│ ".repeat(self.quote_depth), self.styles.blockquote));
        }
    }

    fn list_item_prefix(&mut self) {
        let depth = self.list_stack.len().saturating_sub(1);
        let marker = match self.list_stack.last_mut() {
            Some(Some(next)) => {
                let marker = format!("{}. ", next);
                *next += 1;
                marker
            }
            _ => "• ".to_string(),
        };
        self.line_prefix();
        self.spans.push(Span::styled(
            format!("{}{}", "  ".repeat(depth), marker),
            self.styles.bullet,
        ));
    }

    /// Flush the current span accumulator into a completed line.
    fn flush(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        self.lines.push(Line::from(std::mem::take(&mut self.spans)));
    }

    /// End the current line even if it is empty.
    fn newline(&mut self) {
        self.line_prefix();
        self.lines.push(Line::from(std::mem::take(&mut self.spans)));
    }

    /// End the current block with one blank separator line.
    fn blank(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|line| line.width() > 0) {
            self.lines.push(Line::default());
        }
    }
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Value of attribute `name` in a raw start tag.
fn attr(tag: &str, name: &str) -> Option<String> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')?;
    Some(unescape_entities(&tag[start..start + end]))
}

fn has_flag(tag: &str, name: &str) -> bool {
    tag.split_whitespace()
        .any(|part| part.trim_end_matches('/') == name || part.starts_with(&format!("{name}=")))
}

/// Style for a `<span>`: math spans, or inline colors from the highlighter.
fn span_style(tag: &str, styles: &TerminalStyle) -> Style {
    if attr(tag, "class").is_some_and(|class| class.split_whitespace().any(|c| c == "math")) {
        return styles.math;
    }
    let Some(css) = attr(tag, "style") else {
        return Style::default();
    };

    let mut style = Style::default();
    for declaration in css.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        match (property.trim(), value.trim()) {
            ("color", value) => {
                if let Some(color) = parse_hex(value) {
                    style = style.fg(color);
                }
            }
            ("font-weight", "bold") => style = style.add_modifier(Modifier::BOLD),
            ("font-style", "italic") => style = style.add_modifier(Modifier::ITALIC),
            ("text-decoration", "underline") => style = style.add_modifier(Modifier::UNDERLINED),
            _ => {}
        }
    }
    style
}

fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.strip_prefix('#')?;
    if hex.len() < 6 {
        return None;
    }
    let channel = |at: usize| u8::from_str_radix(hex.get(at..at + 2)?, 16).ok();
    Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Compute the effective style by patching all styles on the stack together.
fn effective_style(stack: &[Style]) -> Style {
    stack
        .iter()
        .fold(Style::default(), |style, next| style.patch(*next))
}

/// Convert ratatui `Text` to an ANSI-escaped string for direct terminal output.
pub fn text_to_ansi(text: &Text) -> String {
    let mut out = String::new();
    for (i, line) in text.lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for span in &line.spans {
            let sgr = style_to_sgr(&span.style);
            if sgr.is_empty() {
                out.push_str(&span.content);
            } else {
                out.push_str(&format!("\x1b[{}m{}\x1b[0m", sgr, span.content));
            }
        }
    }
    out
}

/// SGR parameter list for a style, empty when the style is plain.
fn style_to_sgr(style: &Style) -> String {
    let mut codes: Vec<String> = [
        (Modifier::BOLD, "1"),
        (Modifier::ITALIC, "3"),
        (Modifier::UNDERLINED, "4"),
        (Modifier::CROSSED_OUT, "9"),
    ]
    .iter()
    .filter(|(modifier, _)| style.add_modifier.contains(*modifier))
    .map(|(_, code)| code.to_string())
    .collect();

    codes.extend(style.fg.and_then(|c| color_code(c, false)));
    codes.extend(style.bg.and_then(|c| color_code(c, true)));
    codes.join(";")
}

/// ANSI color parameter; backgrounds sit 10 above their foregrounds.
fn color_code(color: Color, background: bool) -> Option<String> {
    let offset = if background { 10 } else { 0 };
    let basic = |n: u8| Some((n + offset).to_string());
    match color {
        Color::Black => basic(30),
        Color::Red => basic(31),
        Color::Green => basic(32),
        Color::Yellow => basic(33),
        Color::Blue => basic(34),
        Color::Magenta => basic(35),
        Color::Cyan => basic(36),
        Color::White | Color::Gray => basic(37),
        Color::DarkGray => basic(90),
        Color::LightRed => basic(91),
        Color::LightGreen => basic(92),
        Color::LightYellow => basic(93),
        Color::LightBlue => basic(94),
        Color::LightMagenta => basic(95),
        Color::LightCyan => basic(96),
        Color::Indexed(n) => Some(format!("{};5;{}", 38 + offset, n)),
        Color::Rgb(r, g, b) => Some(format!("{};2;{};{};{}", 38 + offset, r, g, b)),
        _ => None,
    }
}
