//! `oz stream`: replay a response as a live generation.
//!
//! The input is cut into fragments and fed to a [`StreamController`] at a
//! steady pace, so the live surface shows exactly what the overlay would
//! show while a model is answering.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use oz_core::{
    GenerationEvent, JsonHistoryFile, LiveSurface, RenderPipeline, StreamController, StreamState,
    TickHandle, TokioScheduler,
};

use crate::config::Config;
use crate::debug_log::DebugLogger;
use crate::render::{load_highlighter, read_input, render_width};
use crate::surface::{HtmlFileSurface, TerminalSurface};

/// Options for one replay.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub input: Option<PathBuf>,
    pub chunk_size: usize,
    pub delay: Duration,
    pub output: Option<PathBuf>,
    pub record: bool,
}

/// How a live session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Interrupted,
}

pub async fn run(config: &Config, options: StreamOptions, logger: Option<&DebugLogger>) -> Result<()> {
    let source = read_input(options.input.as_deref())?;
    let highlighter = load_highlighter(&config.highlight).await;
    let pipeline = RenderPipeline::new(config.render.clone(), highlighter);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = match &options.output {
        Some(path) => {
            let surface = HtmlFileSurface::new(path, config.stream.line_height);
            info!(path = %surface.path().display(), "Streaming into page");
            replay(config, pipeline, surface, &source, &options, &cancel, logger).await?
        }
        None => {
            let surface = TerminalSurface::new(
                std::io::stdout(),
                render_width(),
                config.stream.line_height,
                atty::is(atty::Stream::Stdout),
            );
            replay(config, pipeline, surface, &source, &options, &cancel, logger).await?
        }
    };

    match outcome {
        Outcome::Completed => {
            if options.record {
                record(&config.history_path()?, &source).await?;
            }
            Ok(())
        }
        Outcome::Failed(message) => anyhow::bail!("Generation failed: {}", message),
        Outcome::Interrupted => {
            info!("Stream interrupted");
            Ok(())
        }
    }
}

async fn replay<L: LiveSurface>(
    config: &Config,
    pipeline: RenderPipeline,
    surface: L,
    source: &str,
    options: &StreamOptions,
    cancel: &CancellationToken,
    logger: Option<&DebugLogger>,
) -> Result<Outcome> {
    let (scheduler, mut ticks) = TokioScheduler::new();
    let mut controller = StreamController::new(pipeline, config.stream.clone(), scheduler, surface);
    let (tx, mut events) = mpsc::channel(100);

    controller.start();
    let producer = spawn_producer(
        source.to_string(),
        options.chunk_size,
        options.delay,
        tx,
        cancel.clone(),
    );
    let outcome = drive(&mut controller, &mut ticks, &mut events, cancel, logger).await;
    producer.abort();
    outcome
}

/// Send `text` as fragments of `chunk_size` chars, then completion.
pub fn spawn_producer(
    text: String,
    chunk_size: usize,
    delay: Duration,
    tx: mpsc::Sender<GenerationEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for fragment in split_fragments(&text, chunk_size) {
            if cancel.is_cancelled() {
                return;
            }
            if tx.send(GenerationEvent::Fragment(fragment)).await.is_err() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let _ = tx.send(GenerationEvent::Complete).await;
    })
}

/// Split on char boundaries into pieces of at most `chunk_size` chars.
pub fn split_fragments(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Pump ticks and generation events into `controller` until the session ends.
pub async fn drive<L: LiveSurface>(
    controller: &mut StreamController<TokioScheduler, L>,
    ticks: &mut mpsc::UnboundedReceiver<TickHandle>,
    events: &mut mpsc::Receiver<GenerationEvent>,
    cancel: &CancellationToken,
    logger: Option<&DebugLogger>,
) -> Result<Outcome> {
    log_state(controller, logger);
    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                controller.fail("interrupted")?;
                break Outcome::Interrupted;
            }
            Some(handle) = ticks.recv() => {
                if controller.on_tick(handle) {
                    if let (Some(logger), Some(session), Some(live)) =
                        (logger, controller.session(), controller.live())
                    {
                        logger.log_render(session.buffer(), live);
                    }
                }
            }
            event = events.recv() => match event {
                Some(GenerationEvent::Complete) => {
                    controller.handle_event(GenerationEvent::Complete)?;
                    break Outcome::Completed;
                }
                Some(GenerationEvent::Error(message)) => {
                    controller.handle_event(GenerationEvent::Error(message.clone()))?;
                    break Outcome::Failed(message);
                }
                Some(event) => {
                    if let Err(e) = controller.handle_event(event) {
                        warn!(error = %e, "Dropped fragment");
                        if let Some(logger) = logger {
                            logger.log_warning(&e.to_string());
                        }
                    }
                }
                None => {
                    let message = "generation ended without completing";
                    controller.fail(message)?;
                    break Outcome::Failed(message.to_string());
                }
            },
        }
    };
    log_state(controller, logger);
    debug!(outcome = ?outcome, "Stream drive finished");
    Ok(outcome)
}

fn log_state<L: LiveSurface>(
    controller: &StreamController<TokioScheduler, L>,
    logger: Option<&DebugLogger>,
) {
    let Some(logger) = logger else {
        return;
    };
    let (bytes, fragments) = controller
        .session()
        .map_or((0, 0), |s| (s.buffer().len(), s.fragment_count()));
    let state = controller.state();
    if state == StreamState::Idle && bytes == 0 {
        return;
    }
    logger.log_state(state, bytes, fragments);
}

/// Add a finished response to the history file.
pub async fn record(path: &Path, text: &str) -> Result<()> {
    let file = JsonHistoryFile::new(path);
    match file
        .append(text, Utc::now().timestamp_millis())
        .await
        .with_context(|| format!("Failed to record into {}", path.display()))?
    {
        Some(entry) => info!(id = ?entry.id, path = %path.display(), "Recorded response"),
        None => debug!("Empty response not recorded"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use oz_core::testing::RecordingSurface;
    use oz_core::{PersistenceSource, PlainHighlighter, RenderConfig, StreamConfig};

    fn controller() -> (
        StreamController<TokioScheduler, RecordingSurface>,
        mpsc::UnboundedReceiver<TickHandle>,
    ) {
        let pipeline = RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter));
        let config = StreamConfig::new().with_tick_interval(Duration::from_millis(5));
        let (scheduler, ticks) = TokioScheduler::new();
        (
            StreamController::new(pipeline, config, scheduler, RecordingSurface::default()),
            ticks,
        )
    }

    #[test]
    fn test_split_fragments_char_boundaries() {
        assert_eq!(split_fragments("héllo", 2), vec!["hé", "ll", "o"]);
        assert_eq!(split_fragments("abc", 0), vec!["a", "b", "c"]);
        assert!(split_fragments("", 4).is_empty());
    }

    #[tokio::test]
    async fn test_drive_to_completion() {
        let (mut controller, mut ticks) = controller();
        let (tx, mut events) = mpsc::channel(100);
        let cancel = CancellationToken::new();

        controller.start();
        let producer = spawn_producer(
            "**Hello** world".into(),
            3,
            Duration::from_millis(2),
            tx,
            cancel.clone(),
        );
        let outcome = drive(&mut controller, &mut ticks, &mut events, &cancel, None)
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(controller.state(), StreamState::Idle);
        let surface = controller.surface();
        assert_eq!(surface.completed, 1);
        assert_eq!(surface.replaced.last().map(String::as_str), Some("Hello world"));
        assert_eq!(controller.session().unwrap().fragment_count(), 5);
    }

    #[tokio::test]
    async fn test_drive_reports_source_error() {
        let (mut controller, mut ticks) = controller();
        let (tx, mut events) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        controller.start();
        tx.send(GenerationEvent::Fragment("partial".into())).await.unwrap();
        tx.send(GenerationEvent::Error("quota exceeded".into())).await.unwrap();

        let outcome = drive(&mut controller, &mut ticks, &mut events, &cancel, None)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failed("quota exceeded".into()));
        let surface = controller.surface();
        assert_eq!(surface.failures, vec!["quota exceeded".to_string()]);
        assert_eq!(surface.replaced.last().map(String::as_str), Some("partial"));
    }

    #[tokio::test]
    async fn test_drive_interrupted() {
        let (mut controller, mut ticks) = controller();
        let (_tx, mut events) = mpsc::channel::<GenerationEvent>(10);
        let cancel = CancellationToken::new();

        controller.start();
        cancel.cancel();
        let outcome = drive(&mut controller, &mut ticks, &mut events, &cancel, None)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(controller.surface().failures, vec!["interrupted".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_channel_fails_session() {
        let (mut controller, mut ticks) = controller();
        let (tx, mut events) = mpsc::channel::<GenerationEvent>(10);
        let cancel = CancellationToken::new();

        controller.start();
        drop(tx);
        let outcome = drive(&mut controller, &mut ticks, &mut events, &cancel, None)
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(controller.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_record_prepends_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        record(&path, "first answer").await.unwrap();
        record(&path, "second answer").await.unwrap();
        record(&path, "").await.unwrap();

        let entries = JsonHistoryFile::new(&path).load().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text(), "second answer");
    }
}
