//! Live rendering of a single generation.
//!
//! Fragments are appended to a [`StreamSession`] buffer as they arrive and
//! the whole buffer is re-rendered on a fixed tick, never per fragment. A
//! tick with no new text since the last pass does nothing.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::markup::SafeMarkup;
use crate::pipeline::RenderPipeline;
use crate::{Error, Result};

/// Identifies one scheduled periodic tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(pub u64);

/// Periodic tick source.
///
/// Ticks are delivered out of band: the host passes each fired handle to
/// [`StreamController::on_tick`].
pub trait Scheduler {
    fn schedule_every(&mut self, interval: Duration) -> TickHandle;
    fn cancel(&mut self, handle: TickHandle);
}

/// Scheduler backed by Tokio interval tasks.
///
/// Fired handles arrive on the receiver returned by [`TokioScheduler::new`].
pub struct TokioScheduler {
    next_id: u64,
    tx: mpsc::UnboundedSender<TickHandle>,
    tasks: HashMap<TickHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TickHandle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                next_id: 0,
                tx,
                tasks: HashMap::new(),
            },
            rx,
        )
    }

    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_every(&mut self, interval: Duration) -> TickHandle {
        self.next_id += 1;
        let handle = TickHandle(self.next_id);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(handle).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TickHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Display surface for the live generation.
pub trait LiveSurface {
    /// Replace the displayed content and report its measured height.
    fn replace(&mut self, doc: &SafeMarkup) -> u32;

    /// Resize the hosting surface to `height`, already clamped.
    fn resize(&mut self, height: u32);

    /// The generation finished normally.
    fn complete(&mut self);

    /// The generation source reported an error.
    fn fail(&mut self, message: &str);

    fn clear(&mut self);
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Finalizing,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Streaming => write!(f, "streaming"),
            StreamState::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// Events from the text generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Fragment(String),
    Complete,
    Error(String),
}

/// Accumulated state of one generation.
#[derive(Debug, Default)]
pub struct StreamSession {
    buffer: String,
    fragments: usize,
    rendered: Option<(usize, u64)>,
    tick: Option<TickHandle>,
    completed: bool,
}

impl StreamSession {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn tick(&self) -> Option<TickHandle> {
        self.tick
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn fingerprint(&self) -> (usize, u64) {
        let mut hasher = DefaultHasher::new();
        self.buffer.hash(&mut hasher);
        (self.buffer.len(), hasher.finish())
    }

    fn is_dirty(&self) -> bool {
        self.rendered != Some(self.fingerprint())
    }
}

/// Owns the live session, its tick, and the surface it renders into.
pub struct StreamController<S: Scheduler, L: LiveSurface> {
    pipeline: RenderPipeline,
    config: StreamConfig,
    scheduler: S,
    surface: L,
    state: StreamState,
    session: Option<StreamSession>,
    live: Option<SafeMarkup>,
    height: Option<u32>,
}

impl<S: Scheduler, L: LiveSurface> StreamController<S, L> {
    pub fn new(pipeline: RenderPipeline, config: StreamConfig, scheduler: S, surface: L) -> Self {
        Self {
            pipeline,
            config,
            scheduler,
            surface,
            state: StreamState::Idle,
            session: None,
            live: None,
            height: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Most recently rendered document.
    pub fn live(&self) -> Option<&SafeMarkup> {
        self.live.as_ref()
    }

    pub fn surface(&self) -> &L {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut L {
        &mut self.surface
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Begin a new generation, cancelling any previous session's tick first.
    pub fn start(&mut self) {
        self.cancel_tick();
        self.session = None;
        self.live = None;
        self.height = None;
        self.surface.clear();

        let tick = self.scheduler.schedule_every(self.config.tick_interval());
        self.session = Some(StreamSession {
            tick: Some(tick),
            ..StreamSession::default()
        });
        self.state = StreamState::Streaming;
        debug!(tick = tick.0, interval_ms = self.config.tick_interval_ms, "Stream session started");
    }

    /// Append a fragment. Rendering waits for the next tick.
    pub fn append_fragment(&mut self, text: &str) -> Result<()> {
        let session = match (self.state, self.session.as_mut()) {
            (StreamState::Streaming, Some(session)) => session,
            _ => {
                warn!(state = %self.state, bytes = text.len(), "Fragment outside a streaming session");
                return Err(Error::invalid_state("streaming", self.state.to_string()));
            }
        };
        session.buffer.push_str(text);
        session.fragments += 1;
        trace!(bytes = text.len(), total = session.buffer.len(), "Fragment appended");
        Ok(())
    }

    /// Handle a fired tick. Returns whether a render pass ran.
    pub fn on_tick(&mut self, handle: TickHandle) -> bool {
        let current = self.session.as_ref().and_then(|s| s.tick);
        if self.state != StreamState::Streaming || current != Some(handle) {
            trace!(tick = handle.0, "Ignoring stale tick");
            return false;
        }
        if !self.session.as_ref().is_some_and(StreamSession::is_dirty) {
            return false;
        }
        self.render_pass();
        true
    }

    /// Finish the generation with one last full render.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state != StreamState::Streaming {
            return Err(Error::invalid_state("streaming", self.state.to_string()));
        }
        self.state = StreamState::Finalizing;
        self.cancel_tick();
        if let Some(session) = self.session.as_mut() {
            session.buffer.push_str(&self.config.trailing_separator);
        }
        self.render_pass();
        if let Some(session) = self.session.as_mut() {
            session.completed = true;
        }
        self.state = StreamState::Idle;
        self.surface.complete();
        debug!(
            bytes = self.session.as_ref().map_or(0, |s| s.buffer.len()),
            fragments = self.session.as_ref().map_or(0, |s| s.fragments),
            "Stream session finalized"
        );
        Ok(())
    }

    /// Abort the generation after a source error, keeping what arrived.
    pub fn fail(&mut self, message: &str) -> Result<()> {
        if self.state != StreamState::Streaming {
            return Err(Error::invalid_state("streaming", self.state.to_string()));
        }
        self.cancel_tick();
        if self.session.as_ref().is_some_and(StreamSession::is_dirty) {
            self.render_pass();
        }
        if let Some(session) = self.session.as_mut() {
            session.completed = true;
        }
        self.state = StreamState::Idle;
        self.surface.fail(message);
        warn!(error = message, "Stream session failed");
        Ok(())
    }

    /// Drop the session and clear the surface.
    pub fn reset(&mut self) {
        self.cancel_tick();
        self.session = None;
        self.live = None;
        self.height = None;
        self.state = StreamState::Idle;
        self.surface.clear();
    }

    pub fn handle_event(&mut self, event: GenerationEvent) -> Result<()> {
        match event {
            GenerationEvent::Fragment(text) => self.append_fragment(&text),
            GenerationEvent::Complete => self.finalize(),
            GenerationEvent::Error(message) => self.fail(&message),
        }
    }

    /// Toggle a code block in the live view without re-rendering.
    pub fn click_block(&mut self, index: usize, selection: &str) -> Result<bool> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| Error::invalid_state("rendered", "empty"))?;
        let toggled = live.click_block(index, selection)?;
        if toggled {
            let measured = self.surface.replace(live);
            self.apply_height(measured);
        }
        Ok(toggled)
    }

    fn cancel_tick(&mut self) {
        if let Some(tick) = self.session.as_mut().and_then(|s| s.tick.take()) {
            self.scheduler.cancel(tick);
            trace!(tick = tick.0, "Tick cancelled");
        }
    }

    fn render_pass(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let doc = self.pipeline.render(&session.buffer);
        session.rendered = Some(session.fingerprint());
        let measured = self.surface.replace(&doc);
        self.live = Some(doc);
        self.apply_height(measured);
    }

    fn apply_height(&mut self, measured: u32) {
        let height = self.config.clamp_height(measured);
        if self.height != Some(height) {
            self.height = Some(height);
            self.surface.resize(height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::RenderConfig;
    use crate::highlight::PlainHighlighter;
    use crate::testing::{ManualScheduler, RecordingSurface};

    type Controller = StreamController<ManualScheduler, RecordingSurface>;

    fn controller() -> Controller {
        let pipeline = RenderPipeline::new(RenderConfig::default(), Arc::new(PlainHighlighter));
        StreamController::new(
            pipeline,
            StreamConfig::default(),
            ManualScheduler::default(),
            RecordingSurface::default(),
        )
    }

    fn tick(controller: &mut Controller) -> bool {
        let handle = controller.session().and_then(|s| s.tick()).unwrap();
        controller.on_tick(handle)
    }

    #[test]
    fn test_start_schedules_tick() {
        let mut c = controller();
        c.start();
        assert_eq!(c.state(), StreamState::Streaming);
        assert_eq!(c.scheduler().scheduled(), &[(TickHandle(1), Duration::from_millis(200))]);
        assert_eq!(c.scheduler().active(), vec![TickHandle(1)]);
    }

    #[test]
    fn test_append_requires_streaming() {
        let mut c = controller();
        assert!(matches!(
            c.append_fragment("x"),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_append_does_not_render() {
        let mut c = controller();
        c.start();
        c.append_fragment("hello").unwrap();
        assert!(c.surface().replaced.is_empty());
    }

    #[test]
    fn test_unchanged_buffer_skips_render() {
        let mut c = controller();
        c.start();
        c.append_fragment("hello").unwrap();
        assert!(tick(&mut c));
        assert!(!tick(&mut c));
        assert_eq!(c.surface().replaced.len(), 1);

        c.append_fragment(" world").unwrap();
        assert!(tick(&mut c));
        assert_eq!(c.surface().replaced.last().unwrap(), "hello world");
    }

    #[test]
    fn test_empty_session_tick_renders_nothing_new() {
        let mut c = controller();
        c.start();
        assert!(tick(&mut c));
        assert!(!tick(&mut c));
    }

    #[test]
    fn test_split_markup_token_renders_after_join() {
        let mut c = controller();
        c.start();
        for fragment in ["**bo", "ld** and `co", "de`"] {
            c.append_fragment(fragment).unwrap();
        }
        tick(&mut c);
        let html = c.live().unwrap().to_html();
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn test_restart_cancels_previous_tick() {
        let mut c = controller();
        c.start();
        c.append_fragment("old").unwrap();
        c.start();
        assert_eq!(c.scheduler().cancelled(), &[TickHandle(1)]);
        assert_eq!(c.scheduler().active(), vec![TickHandle(2)]);
        assert!(!c.on_tick(TickHandle(1)));
        assert_eq!(c.session().unwrap().buffer(), "");
    }

    #[test]
    fn test_finalize_appends_separator_and_completes() {
        let mut c = controller();
        c.start();
        c.append_fragment("done").unwrap();
        c.finalize().unwrap();
        assert_eq!(c.state(), StreamState::Idle);
        assert_eq!(c.session().unwrap().buffer(), "done\n\n");
        assert!(c.session().unwrap().is_completed());
        assert_eq!(c.surface().completed, 1);
        assert!(c.scheduler().active().is_empty());
        assert_eq!(c.surface().replaced.len(), 1);
        assert!(!c.on_tick(TickHandle(1)));
    }

    #[test]
    fn test_finalize_when_idle_is_error() {
        let mut c = controller();
        assert!(c.finalize().is_err());
    }

    #[test]
    fn test_resize_clamped() {
        let mut c = controller();
        c.start();
        c.append_fragment("one line").unwrap();
        tick(&mut c);
        assert_eq!(c.surface().resizes, vec![120]);

        let long: String = (0..100).map(|i| format!("line {i}\n\n")).collect();
        c.append_fragment(&long).unwrap();
        tick(&mut c);
        assert_eq!(c.surface().resizes, vec![120, 600]);
    }

    #[test]
    fn test_fail_renders_partial_and_reports() {
        let mut c = controller();
        c.start();
        c.append_fragment("partial").unwrap();
        c.fail("connection reset").unwrap();
        assert_eq!(c.state(), StreamState::Idle);
        assert_eq!(c.surface().failures, vec!["connection reset".to_string()]);
        assert_eq!(c.surface().replaced, vec!["partial".to_string()]);
        assert!(c.scheduler().active().is_empty());
    }

    #[test]
    fn test_handle_event_protocol() {
        let mut c = controller();
        c.start();
        c.handle_event(GenerationEvent::Fragment("a".into())).unwrap();
        c.handle_event(GenerationEvent::Fragment("b".into())).unwrap();
        c.handle_event(GenerationEvent::Complete).unwrap();
        assert_eq!(c.session().unwrap().buffer(), "ab\n\n");
        assert_eq!(c.session().unwrap().fragment_count(), 2);
        assert!(c.handle_event(GenerationEvent::Fragment("late".into())).is_err());
    }

    #[test]
    fn test_click_block_and_rerender_resets() {
        let mut c = controller();
        c.start();
        let code: String = (0..25).map(|i| format!("x{i}\n")).collect();
        c.append_fragment(&format!("```\n{code}```")).unwrap();
        tick(&mut c);
        assert!(!c.live().unwrap().blocks()[0].is_expanded());

        assert!(!c.click_block(0, "selected").unwrap());
        assert!(c.click_block(0, "").unwrap());
        assert!(c.live().unwrap().blocks()[0].is_expanded());

        c.append_fragment("\nmore").unwrap();
        tick(&mut c);
        assert!(!c.live().unwrap().blocks()[0].is_expanded());
    }

    #[test]
    fn test_reset_clears() {
        let mut c = controller();
        c.start();
        c.reset();
        assert_eq!(c.state(), StreamState::Idle);
        assert!(c.session().is_none());
        assert!(c.scheduler().active().is_empty());
        assert_eq!(c.surface().clears, 2);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_and_cancels() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let handle = scheduler.schedule_every(Duration::from_millis(5));
        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(fired, Some(handle));

        scheduler.cancel(handle);
        assert_eq!(scheduler.active(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }
}
