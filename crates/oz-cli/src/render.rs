use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::terminal::size as terminal_size;
use tracing::{info, warn};

use oz_core::{HighlightConfig, Highlighter, PlainHighlighter, RenderPipeline, SyntectHighlighter};

use crate::config::Config;
use crate::debug_log::DebugLogger;
use crate::page::render_page;
use crate::surface::write_atomic;
use crate::terminal::{markup_to_text, text_to_ansi};

/// Read `input`, or stdin when it is absent or `-`.
pub fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            Ok(content)
        }
    }
}

/// Load the configured highlighter on a blocking thread.
///
/// Grammar loading is the slow part of startup; callers await this once
/// before the first render. Any failure degrades to plain code blocks.
pub async fn load_highlighter(config: &HighlightConfig) -> Arc<dyn Highlighter> {
    if !config.enabled {
        return Arc::new(PlainHighlighter);
    }
    let theme = config.theme.clone();
    match tokio::task::spawn_blocking(move || SyntectHighlighter::load(&theme)).await {
        Ok(Ok(highlighter)) => Arc::new(highlighter),
        Ok(Err(e)) => {
            warn!(error = %e, "Highlighter unavailable, code blocks will be plain");
            Arc::new(PlainHighlighter)
        }
        Err(e) => {
            warn!(error = %e, "Highlighter load task failed");
            Arc::new(PlainHighlighter)
        }
    }
}

/// Terminal width available for rendering.
pub fn render_width() -> usize {
    let (width, _) = terminal_size().unwrap_or((80, 24));
    (width as usize).saturating_sub(2).max(40)
}

/// How a one-shot render is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Ansi,
    Page,
}

impl OutputFormat {
    /// Plain when asked; otherwise a page for files and pipes, ANSI for terminals.
    pub fn choose(plain: bool, to_file: bool, stdout_is_terminal: bool) -> Self {
        if plain {
            OutputFormat::Plain
        } else if to_file || !stdout_is_terminal {
            OutputFormat::Page
        } else {
            OutputFormat::Ansi
        }
    }
}

pub async fn run(
    config: &Config,
    input: Option<&Path>,
    output: Option<&PathBuf>,
    plain: bool,
    logger: Option<&DebugLogger>,
) -> Result<()> {
    let source = read_input(input)?;
    let highlighter = load_highlighter(&config.highlight).await;
    let pipeline = RenderPipeline::new(config.render.clone(), highlighter);

    let format = OutputFormat::choose(plain, output.is_some(), atty::is(atty::Stream::Stdout));
    let rendered = render_to(&pipeline, &source, format, render_width());
    if let Some(logger) = logger {
        logger.log_render(&source, &pipeline.render(&source));
    }

    match output {
        Some(path) => {
            write_atomic(path, rendered.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = rendered.len(), "Wrote rendered output");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Render `source` in the requested format.
pub fn render_to(pipeline: &RenderPipeline, source: &str, format: OutputFormat, width: usize) -> String {
    let doc = pipeline.render(source);
    match format {
        OutputFormat::Plain => doc.plain_text(),
        OutputFormat::Ansi => text_to_ansi(&markup_to_text(&doc, width, None)),
        OutputFormat::Page => render_page(&doc, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oz_core::RenderConfig;

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter))
    }

    #[test]
    fn test_choose_format() {
        assert_eq!(OutputFormat::choose(true, true, true), OutputFormat::Plain);
        assert_eq!(OutputFormat::choose(false, true, true), OutputFormat::Page);
        assert_eq!(OutputFormat::choose(false, false, false), OutputFormat::Page);
        assert_eq!(OutputFormat::choose(false, false, true), OutputFormat::Ansi);
    }

    #[test]
    fn test_render_plain_strips_role_tags() {
        let out = render_to(&pipeline(), "Assistant: **Hi** there", OutputFormat::Plain, 80);
        assert_eq!(out, "Hi there");
    }

    #[test]
    fn test_render_page_contains_block() {
        let out = render_to(&pipeline(), "```py\nprint(1)\n```", OutputFormat::Page, 80);
        assert!(out.contains("class=\"code-block static\""));
        assert!(out.contains("print(1)"));
    }

    #[test]
    fn test_read_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.md");
        std::fs::write(&path, "# Heading").unwrap();
        assert_eq!(read_input(Some(&path)).unwrap(), "# Heading");
        assert!(read_input(Some(&dir.path().join("missing.md"))).is_err());
    }

    #[tokio::test]
    async fn test_disabled_highlighter_is_plain() {
        let config = HighlightConfig {
            enabled: false,
            ..HighlightConfig::default()
        };
        assert_eq!(load_highlighter(&config).await.name(), "plain");
    }

    #[tokio::test]
    async fn test_unknown_theme_falls_back() {
        let config = HighlightConfig {
            enabled: true,
            theme: "no-such-theme".into(),
        };
        assert_eq!(load_highlighter(&config).await.name(), "plain");
    }
}
