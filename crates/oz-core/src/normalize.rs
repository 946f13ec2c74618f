//! Structural repair of model output before it reaches the markdown parser.
//!
//! Language models routinely emit markdown that a strict parser mangles:
//! fences glued to prose, tables without a separator row, TeX delimiters
//! that markdown escaping would eat. [`normalize`] fixes those defects in a
//! fixed sequence of passes:
//!
//! 1. strip bracketed speaker labels (`[assistant]:`) from line starts
//! 2. put every fence marker on its own line, padded by blank lines
//! 3. collapse runs of 3+ blank lines directly after an opening fence
//! 4. synthesize missing table separator rows
//! 5. pad table blocks with blank lines
//! 6. protect `\[..\]`, `\(..\)` and `$$..$$` math from markdown escaping
//! 7. collapse runs of 3+ blank lines to 2
//!
//! Passes 4 through 7 never touch the content of fenced code blocks.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Upper bound on table repair passes.
const MAX_TABLE_PASSES: usize = 10;

static ROLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)\[(?i:assistant|user|system|ai|bot|model|human|you)\]:?[ \t]*")
        .expect("role tag pattern")
});

// Indentation plus an optional list marker ahead of a fence.
static FENCE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:(?:[-*+]|\d+[.)])[ \t]+)?").expect("fence prefix pattern")
});

// Inline code spans are matched first so their content is left alone.
static MATH_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(`[^`\n]*`)|\\\[(.+?)\\\]|\\\((.+?)\\\)|\$\$(.+?)\$\$").expect("math pattern")
});

/// Repair structural markup defects in raw model output.
///
/// Pure and total: any input produces an output, and the same input always
/// produces the same output.
pub fn normalize(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();

    strip_role_tags(&mut lines);
    let lines = pad_fences(split_fences(lines));
    let lines = collapse_after_open(lines);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for region in regions(lines) {
        match region {
            Region::Code(code) => out.extend(code),
            Region::Prose(mut prose) => {
                repair_tables(&mut prose);
                let prose = space_tables(prose);
                let protected = protect_math(&prose.join("\n"));
                out.extend(collapse_blank_runs(
                    protected.split('\n').map(str::to_string).collect(),
                ));
            }
        }
    }
    out.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    ch: char,
    len: usize,
}

impl Fence {
    fn marker(&self) -> String {
        std::iter::repeat(self.ch).take(self.len).collect()
    }

    fn closed_by(&self, other: Fence) -> bool {
        other.ch == self.ch && other.len >= self.len
    }
}

/// Split a line that starts (after indentation or a list marker) with a
/// fence run into `(fence, indent, rest)`.
fn fence_run(line: &str) -> Option<(Fence, &str, &str)> {
    let prefix = FENCE_PREFIX.find(line).map_or(0, |m| m.end());
    let (indent, trimmed) = line.split_at(prefix);
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    Some((Fence { ch, len }, indent, &trimmed[len..]))
}

fn opens(fence: Fence, info: &str) -> bool {
    fence.ch != '`' || !info.contains('`')
}

/// Byte offsets and lengths of every backtick run in `line`.
fn backtick_runs(line: &str) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            runs.push((start, i - start));
        } else {
            i += 1;
        }
    }
    runs
}

/// Offset of an opening fence glued to the end of a prose line.
fn glued_opening(line: &str) -> Option<usize> {
    let (start, len) = backtick_runs(line).into_iter().find(|(_, len)| *len >= 3)?;
    let glued = !line[..start].trim().is_empty() && !line[start + len..].contains('`');
    glued.then_some(start)
}

/// Offset of a closing fence glued to the end of a code line.
fn glued_closing(line: &str, fence: Fence) -> Option<usize> {
    if fence.ch != '`' {
        return None;
    }
    backtick_runs(line).into_iter().find_map(|(start, len)| {
        let after = line[start + len..].chars().next();
        let glued = len >= fence.len
            && !line[..start].trim().is_empty()
            && after.map_or(true, char::is_whitespace);
        glued.then_some(start)
    })
}

fn strip_role_tags(lines: &mut [String]) {
    let mut open: Option<Fence> = None;
    for line in lines.iter_mut() {
        if let Some(fence) = open {
            if let Some((run, _, _)) = fence_run(line) {
                if fence.closed_by(run) {
                    open = None;
                }
            }
            continue;
        }
        if ROLE_TAG.is_match(line) {
            *line = ROLE_TAG.replace(line, "$1").into_owned();
        }
        if let Some((run, _, info)) = fence_run(line) {
            if opens(run, info) {
                open = Some(run);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Prose,
    Open,
    Code,
    Close,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    kind: Kind,
}

impl Line {
    fn new(text: impl Into<String>, kind: Kind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    fn is_blank_prose(&self) -> bool {
        self.kind == Kind::Prose && self.text.trim().is_empty()
    }
}

/// Classify lines and put every fence marker on a line of its own.
fn split_fences(lines: Vec<String>) -> Vec<Line> {
    let mut out = Vec::with_capacity(lines.len());
    let mut open: Option<Fence> = None;

    for line in lines {
        let mut pending = Some(line);
        while let Some(line) = pending.take() {
            match open {
                None => {
                    if let Some((run, _, info)) = fence_run(&line) {
                        if opens(run, info) {
                            open = Some(run);
                            out.push(Line::new(line, Kind::Open));
                        } else {
                            out.push(Line::new(line, Kind::Prose));
                        }
                    } else if let Some(at) = glued_opening(&line) {
                        out.push(Line::new(line[..at].trim_end(), Kind::Prose));
                        pending = Some(line[at..].to_string());
                    } else {
                        out.push(Line::new(line, Kind::Prose));
                    }
                }
                Some(fence) => {
                    if let Some((run, indent, rest)) = fence_run(&line) {
                        let trailing_prose = rest.starts_with(char::is_whitespace);
                        if fence.closed_by(run) && (rest.trim().is_empty() || trailing_prose) {
                            let rest = rest.trim();
                            if !rest.is_empty() {
                                pending = Some(rest.to_string());
                            }
                            out.push(Line::new(format!("{indent}{}", run.marker()), Kind::Close));
                            open = None;
                            continue;
                        }
                    }
                    if let Some(at) = glued_closing(&line, fence) {
                        out.push(Line::new(&line[..at], Kind::Code));
                        pending = Some(line[at..].to_string());
                    } else {
                        out.push(Line::new(line, Kind::Code));
                    }
                }
            }
        }
    }
    out
}

/// Blank line before every opening fence and after every closing fence.
fn pad_fences(lines: Vec<Line>) -> Vec<Line> {
    let mut out: Vec<Line> = Vec::with_capacity(lines.len() + 4);
    let mut iter = lines.into_iter().peekable();
    while let Some(line) = iter.next() {
        match line.kind {
            Kind::Open => {
                if out.last().is_some_and(|prev| !prev.is_blank_prose()) {
                    out.push(Line::new("", Kind::Prose));
                }
                out.push(line);
            }
            Kind::Close => {
                out.push(line);
                if iter.peek().is_some_and(|next| !next.is_blank_prose()) {
                    out.push(Line::new("", Kind::Prose));
                }
            }
            _ => out.push(line),
        }
    }
    out
}

fn collapse_after_open(lines: Vec<Line>) -> Vec<Line> {
    let mut out = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();
    while let Some(line) = iter.next() {
        let is_open = line.kind == Kind::Open;
        out.push(line);
        if !is_open {
            continue;
        }
        let mut blanks = Vec::new();
        while let Some(next) = iter.next_if(|l| l.kind == Kind::Code && l.text.trim().is_empty()) {
            blanks.push(next);
        }
        if blanks.len() >= 3 {
            blanks.truncate(1);
        }
        out.extend(blanks);
    }
    out
}

enum Region {
    Prose(Vec<String>),
    Code(Vec<String>),
}

fn regions(lines: Vec<Line>) -> Vec<Region> {
    let mut out: Vec<Region> = Vec::new();
    for line in lines {
        let code = line.kind != Kind::Prose;
        match out.last_mut() {
            Some(Region::Code(buf)) if code => buf.push(line.text),
            Some(Region::Prose(buf)) if !code => buf.push(line.text),
            _ if code => out.push(Region::Code(vec![line.text])),
            _ => out.push(Region::Prose(vec![line.text])),
        }
    }
    out
}

/// Unescaped pipe count.
fn pipe_count(line: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in line.chars() {
        match c {
            '\\' => escaped = !escaped,
            '|' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count
}

fn is_pipe_line(line: &str) -> bool {
    line.trim_start().starts_with('|') && pipe_count(line) >= 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('-')
        && trimmed.contains('|')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':') || c.is_whitespace())
}

fn separator_row(header: &str) -> String {
    let columns = pipe_count(header).saturating_sub(1).max(1);
    let cells = vec!["---"; columns].join(" | ");
    format!("| {cells} |")
}

/// `(start, end)` line ranges of consecutive pipe-delimited lines, at least two long.
fn pipe_runs(lines: &[String]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_pipe_line(&lines[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < lines.len() && is_pipe_line(&lines[i]) {
            i += 1;
        }
        if i - start >= 2 {
            runs.push((start, i));
        }
    }
    runs
}

fn repair_tables(lines: &mut Vec<String>) {
    for _ in 0..MAX_TABLE_PASSES {
        let missing: Vec<usize> = pipe_runs(lines)
            .into_iter()
            .filter(|(start, _)| {
                !is_separator_row(&lines[*start]) && !is_separator_row(&lines[start + 1])
            })
            .map(|(start, _)| start)
            .collect();
        if missing.is_empty() {
            return;
        }
        for start in missing.into_iter().rev() {
            let row = separator_row(&lines[start]);
            lines.insert(start + 1, row);
        }
    }
}

fn space_tables(lines: Vec<String>) -> Vec<String> {
    let tables: Vec<(usize, usize)> = pipe_runs(&lines)
        .into_iter()
        .filter(|(start, _)| is_separator_row(&lines[start + 1]))
        .collect();
    if tables.is_empty() {
        return lines;
    }

    let mut out = Vec::with_capacity(lines.len() + tables.len() * 2);
    let mut tables = tables.into_iter().peekable();
    for (i, line) in lines.iter().enumerate() {
        if let Some(&(start, end)) = tables.peek() {
            if i == start && i > 0 && !lines[i - 1].trim().is_empty() {
                out.push(String::new());
            }
            out.push(line.clone());
            if i + 1 == end {
                tables.next();
                if end < lines.len() && !lines[end].trim().is_empty() {
                    out.push(String::new());
                }
            }
        } else {
            out.push(line.clone());
        }
    }
    out
}

fn protect(content: &str) -> String {
    content.replace('\n', " ").replace('\\', "\\\\")
}

fn protect_math(text: &str) -> String {
    MATH_SPAN
        .replace_all(text, |caps: &Captures| {
            if let Some(code) = caps.get(1) {
                code.as_str().to_string()
            } else if let Some(display) = caps.get(2).or_else(|| caps.get(4)) {
                format!("$${}$$", protect(display.as_str()))
            } else if let Some(inline) = caps.get(3) {
                format!("\\\\({}\\\\)", protect(inline.as_str()))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn collapse_blank_runs(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut run = 0;
    for line in lines {
        if line.trim().is_empty() {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_gets_separator() {
        let out = normalize("| a | b |\n| 1 | 2 |");
        assert_eq!(out, "| a | b |\n| --- | --- |\n| 1 | 2 |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]));
        assert_eq!(pipe_count(lines[1]) - 1, 2);
    }

    #[test]
    fn test_existing_separator_untouched() {
        let input = "| a | b |\n|:--|--:|\n| 1 | 2 |";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_single_pipe_line_not_a_table() {
        assert_eq!(normalize("| lonely |"), "| lonely |");
    }

    #[test]
    fn test_separator_column_floor() {
        assert_eq!(separator_row("|x"), "| --- |");
    }

    #[test]
    fn test_multiple_tables_repaired() {
        let out = normalize("| a |\n| 1 |\n\ntext\n\n| b | c |\n| 2 | 3 |");
        assert_eq!(
            out,
            "| a |\n| --- |\n| 1 |\n\ntext\n\n| b | c |\n| --- | --- |\n| 2 | 3 |"
        );
    }

    #[test]
    fn test_table_spaced_from_prose() {
        let out = normalize("Results:\n| a | b |\n| 1 | 2 |\nDone");
        assert_eq!(out, "Results:\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n\nDone");
    }

    #[test]
    fn test_display_math_protected() {
        assert_eq!(normalize("\\[ x^2 \n + 1 \\]"), "$$ x^2   + 1 $$");
    }

    #[test]
    fn test_display_math_backslashes_doubled() {
        assert_eq!(normalize("\\[\\frac{a}{b}\\]"), "$$\\\\frac{a}{b}$$");
    }

    #[test]
    fn test_inline_math_protected() {
        assert_eq!(normalize("where \\(a\\) holds"), "where \\\\(a\\\\) holds");
    }

    #[test]
    fn test_dollar_math_backslashes_doubled() {
        assert_eq!(normalize("$$\\{x\\}$$"), "$$\\\\{x\\\\}$$");
    }

    #[test]
    fn test_math_inside_inline_code_left_alone() {
        assert_eq!(normalize("use `\\(x\\)` here"), "use `\\(x\\)` here");
    }

    #[test]
    fn test_math_in_table_cell_is_segmented_first() {
        // The pipe inside the formula is counted as a column boundary.
        let out = normalize("| \\(a|b\\) | c |\n| 1 | 2 |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "| --- | --- | --- |");
        assert!(lines[0].contains("\\\\(a|b\\\\)"));
    }

    #[test]
    fn test_role_tags_stripped() {
        assert_eq!(normalize("[assistant]: Hello\n[User] hi"), "Hello\nhi");
    }

    #[test]
    fn test_reference_links_survive() {
        let input = "See [1].\n\n[1]: https://example.com";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_role_tag_inside_code_kept() {
        let input = "```toml\n[user]\nname = \"x\"\n```";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_glued_opening_fence_split() {
        assert_eq!(
            normalize("Here is code:```rust\nfn main() {}\n```"),
            "Here is code:\n\n```rust\nfn main() {}\n```"
        );
    }

    #[test]
    fn test_glued_closing_fence_split() {
        assert_eq!(
            normalize("```\nx = 1```\nDone."),
            "```\nx = 1\n```\n\nDone."
        );
    }

    #[test]
    fn test_prose_after_closing_fence_split() {
        assert_eq!(normalize("```\nx\n``` Done."), "```\nx\n```\n\nDone.");
    }

    #[test]
    fn test_adjacent_fences_padded() {
        assert_eq!(
            normalize("```\na\n```\n```\nb\n```"),
            "```\na\n```\n\n```\nb\n```"
        );
    }

    #[test]
    fn test_inline_triple_backticks_not_split() {
        let input = "inline ```x``` span";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_list_item_fence_not_split() {
        let input = "- ```\n  code\n  ```";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_blank_lines_after_open_collapsed() {
        assert_eq!(normalize("```py\n\n\n\n\nx\n```"), "```py\n\nx\n```");
        assert_eq!(normalize("```py\n\n\nx\n```"), "```py\n\n\nx\n```");
    }

    #[test]
    fn test_blank_runs_collapsed_outside_fences() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\n\nb");
        let code = "```\na\n\n\n\n\nb\n```";
        assert_eq!(normalize(code), code);
    }

    #[test]
    fn test_tables_inside_code_untouched() {
        let code = "```\n| a | b |\n| 1 | 2 |\n```";
        assert_eq!(normalize(code), code);
    }

    #[test]
    fn test_crlf_and_trailing_newline() {
        assert_eq!(normalize("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let input = "```\n| a |\n| b |";
        assert_eq!(normalize(input), input);
    }

    #[test]
    fn test_idempotent_on_clean_input() {
        let input = "# Title\n\nSome *text*.\n\n```rust\nlet x = 1;\n```\n";
        assert_eq!(normalize(input), input);
        assert_eq!(normalize(&normalize(input)), normalize(input));
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize(""), "");
    }
}
