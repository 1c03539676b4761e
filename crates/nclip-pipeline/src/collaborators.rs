//! External collaborator seams.
//!
//! Each generation service sits behind a trait so runs can be driven by
//! real HTTP/CLI clients or by in-memory fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nclip_models::{Report, ScrapedReport, Segment, SegmentDraft, VisualKind, WordToken};

use crate::error::PipelineResult;

/// What the ranker sees of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingCandidate {
    pub index: usize,
    pub title: String,
    pub summary: String,
}

/// The ranker's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingScore {
    pub index: i64,
    #[serde(alias = "nyhedsscore")]
    pub score: i64,
    #[serde(default, alias = "begrundelse")]
    pub justification: String,
}

/// Supplies scraped reports.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self) -> PipelineResult<Vec<ScrapedReport>>;
}

/// Scores candidates for newsworthiness.
#[async_trait]
pub trait ReportRanker: Send + Sync {
    async fn rank(&self, candidates: &[RankingCandidate]) -> PipelineResult<Vec<RankingScore>>;
}

/// Splits a report into narration segments.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, report: &Report) -> PipelineResult<Vec<SegmentDraft>>;
}

/// Text to speech. Writes audio to `output` and returns its path.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<PathBuf>;
}

/// Prompt to image or video. Writes the asset to `output` and returns its path.
#[async_trait]
pub trait VisualGenerator: Send + Sync {
    fn kind(&self) -> VisualKind;

    async fn generate(&self, segment: &Segment, output: &Path) -> PipelineResult<PathBuf>;
}

/// Speech to timed words, in the audio's local time.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<WordToken>>;
}
