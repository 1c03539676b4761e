#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the NewsClip media stages.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Timeouts and cancellation via tokio
//! - Duration reconciliation plans and their FFmpeg application
//! - ASS caption documents
//! - Composition plans and the renderer that turns them into one video

pub mod captions;
pub mod command;
pub mod engine;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod reconcile;
pub mod timeline;

pub use captions::{build_ass_document, CaptionStyle};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use filters::{cover_geometry, CoverGeometry, KenBurns};
pub use fs_utils::{move_file, PartialOutput};
pub use probe::{probe_duration, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use reconcile::{ReconciliationPlan, SpeedBounds};
pub use timeline::{AudioLayout, CompositionPlan, PlannedSegment, VisualSource};
