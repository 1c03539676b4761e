//! Shared data models for the NewsClip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scraped and scored police reports
//! - Narration segments and their media assets
//! - Word tokens, caption cues and timeline placements
//! - Encoding and output format configuration

pub mod asset;
pub mod caption;
pub mod encoding;
pub mod error;
pub mod report;
pub mod run;
pub mod segment;
pub mod timeline;
pub mod timestamp;
pub mod utils;

// Re-export common types
pub use asset::{AudioAsset, ProcessedVisualAsset, RawVisualAsset, VisualKind};
pub use caption::{CaptionCue, WordToken};
pub use encoding::{EncodingConfig, OutputFormat};
pub use error::{ModelError, ModelResult};
pub use report::{Report, ScrapedReport};
pub use run::{RunId, RunManifest, SkippedSegment};
pub use segment::{Segment, SegmentDraft, MAX_SEGMENTS, MIN_SEGMENTS};
pub use timeline::TimelinePlacement;
pub use utils::{final_video_name, sanitize_output_title};
