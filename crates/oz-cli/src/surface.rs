//! Live surfaces for `oz stream`: a redrawing terminal region and an HTML file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    terminal::{Clear, ClearType},
};
use tracing::{trace, warn};

use oz_core::{LiveSurface, SafeMarkup};

use crate::page::{render_page, PageStatus};
use crate::terminal::{markup_to_text, text_to_ansi, wrapped_height};

/// Redraws the live document in place, like a streaming markdown printer.
///
/// When the output is not a terminal nothing is drawn until the session ends,
/// and then the final document is written once.
pub struct TerminalSurface<W: Write> {
    out: W,
    width: usize,
    line_height: u32,
    interactive: bool,
    /// Rows drawn by the previous pass, cleared before the next one.
    drawn_rows: u16,
    last: String,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, width: usize, line_height: u32, interactive: bool) -> Self {
        Self {
            out,
            width: width.max(20),
            line_height: line_height.max(1),
            interactive,
            drawn_rows: 0,
            last: String::new(),
        }
    }

    fn erase(&mut self) -> io::Result<()> {
        if self.drawn_rows == 0 {
            return Ok(());
        }
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        for _ in 1..self.drawn_rows {
            queue!(self.out, MoveUp(1), Clear(ClearType::CurrentLine))?;
        }
        self.drawn_rows = 0;
        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        self.erase()?;
        write!(self.out, "{}", self.last)?;
        self.out.flush()
    }

    fn finish(&mut self, trailer: Option<String>) -> io::Result<()> {
        if !self.interactive {
            write!(self.out, "{}", self.last)?;
        }
        writeln!(self.out)?;
        if let Some(trailer) = trailer {
            writeln!(self.out, "{}", trailer)?;
        }
        self.drawn_rows = 0;
        self.out.flush()
    }
}

impl<W: Write> LiveSurface for TerminalSurface<W> {
    fn replace(&mut self, doc: &SafeMarkup) -> u32 {
        let text = markup_to_text(doc, self.width, None);
        let rows = wrapped_height(&text, self.width);
        self.last = text_to_ansi(&text);

        if self.interactive {
            if let Err(e) = self.draw() {
                warn!(error = %e, "Terminal redraw failed");
            }
            self.drawn_rows = u16::try_from(rows).unwrap_or(u16::MAX);
        }
        u32::try_from(rows)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.line_height)
    }

    fn resize(&mut self, height: u32) {
        // A terminal region grows with its content; only record the request.
        trace!(height, "Terminal surface resize");
    }

    fn complete(&mut self) {
        if let Err(e) = self.finish(None) {
            warn!(error = %e, "Terminal output failed");
        }
    }

    fn fail(&mut self, message: &str) {
        let trailer = format!("\x1b[31mError: {}\x1b[0m", message);
        if let Err(e) = self.finish(Some(trailer)) {
            warn!(error = %e, "Terminal output failed");
        }
    }

    fn clear(&mut self) {
        self.last.clear();
        if let Err(e) = self.erase().and_then(|_| self.out.flush()) {
            warn!(error = %e, "Terminal clear failed");
        }
    }
}

/// Writes the live document as a standalone HTML page after every change.
pub struct HtmlFileSurface {
    path: PathBuf,
    line_height: u32,
    doc: SafeMarkup,
    height: Option<u32>,
    status: Option<PageStatus>,
}

impl HtmlFileSurface {
    pub fn new(path: impl Into<PathBuf>, line_height: u32) -> Self {
        Self {
            path: path.into(),
            line_height: line_height.max(1),
            doc: SafeMarkup::new(),
            height: None,
            status: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self) {
        let page = render_page(&self.doc, self.height, self.status.as_ref());
        if let Err(e) = write_atomic(&self.path, page.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write live page");
        }
    }
}

impl LiveSurface for HtmlFileSurface {
    fn replace(&mut self, doc: &SafeMarkup) -> u32 {
        self.doc = doc.clone();
        self.status = Some(PageStatus::Streaming);
        self.write();
        let rows = doc.plain_text().lines().count().max(1);
        u32::try_from(rows)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.line_height)
    }

    fn resize(&mut self, height: u32) {
        self.height = Some(height);
        self.write();
    }

    fn complete(&mut self) {
        self.status = Some(PageStatus::Complete);
        self.write();
    }

    fn fail(&mut self, message: &str) {
        self.status = Some(PageStatus::Failed(message.to_string()));
        self.write();
    }

    fn clear(&mut self) {
        self.doc = SafeMarkup::new();
        self.height = None;
        self.status = None;
        self.write();
    }
}

/// Write through a sibling temp file so a watching browser never reads half a page.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
