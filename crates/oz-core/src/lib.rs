//! oz-core: rendering, streaming and history core for the oz assistant overlay
//!
//! Raw model output flows through [`normalize`] and [`RichTextRenderer`] into a
//! [`SafeMarkup`] document whose code fences are wrapped by the
//! [`CodeBlockPresenter`]. The [`StreamController`] drives that pipeline for a
//! live generation, and [`HistoryView`] drives it for a paginated, searchable
//! log of past interactions.

pub mod config;
pub mod debounce;
pub mod error;
pub mod highlight;
pub mod history;
pub mod markup;
pub mod math;
pub mod normalize;
pub mod notice;
pub mod paginate;
pub mod pipeline;
pub mod present;
pub mod stream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{HighlightConfig, HistoryConfig, RenderConfig, StreamConfig};
pub use debounce::Debouncer;
pub use error::Error;
pub use highlight::{Highlighter, PlainHighlighter};
#[cfg(feature = "syntect")]
pub use highlight::SyntectHighlighter;
pub use history::{
    EntryId, HistoryEntry, HistoryStore, HistoryView, JsonHistoryFile, PersistenceSource,
    SearchIndex,
};
pub use markup::{RichTextRenderer, SafeMarkup, Segment};
pub use math::{Delimiter, DelimiterConfig, SpanTypesetter, Typesetter};
pub use normalize::normalize;
pub use notice::{copy_block, copy_text, Clipboard, Notice, NoticeBoard, NoticeLevel};
pub use paginate::{EmptyState, ListSurface, PaginatedList, RenderedEntry, ScrollMetrics, ViewState};
pub use pipeline::RenderPipeline;
pub use present::{BlockState, CodeBlockPresenter, PresentedBlock};
pub use stream::{
    GenerationEvent, LiveSurface, Scheduler, StreamController, StreamSession, StreamState,
    TickHandle, TokioScheduler,
};

pub type Result<T> = std::result::Result<T, Error>;
