//! News video pipeline.
//!
//! This crate provides:
//! - Report ranking and segmentation through external collaborators
//! - Segment scheduling and caption grouping
//! - Cache/reuse decisions across runs
//! - Bounded fork-join for per-segment work with per-call timeouts and retries
//! - Composition planning and the run orchestrator

pub mod cache;
pub mod captions;
pub mod collaborators;
pub mod compositor;
pub mod config;
pub mod context;
pub mod elevenlabs;
pub mod error;
pub mod fanout;
pub mod gemini;
pub mod logging;
pub mod pipeline;
pub mod ranking;
pub mod replicate;
pub mod reports;
pub mod retry;
pub mod scheduler;
pub mod whisper;

pub use cache::{ArtifactKind, CacheLayout, CachePolicy, CachedSegments};
pub use collaborators::{
    RankingCandidate, RankingScore, ReportRanker, ReportSource, Segmenter, SpeechSynthesizer,
    Transcriber, VisualGenerator,
};
pub use compositor::{ComposedTimeline, Compositor, SegmentOutcome};
pub use config::{NarrationMode, PipelineConfig};
pub use context::{Collaborators, PipelineContext};
pub use error::{PipelineError, PipelineResult};
pub use logging::RunLogger;
pub use pipeline::Pipeline;
pub use retry::{CallPolicy, RetryConfig};
