//! Run identity and the manifest written next to each finished video.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::TimelinePlacement;

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A segment left out of the final video, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SkippedSegment {
    pub segment: usize,
    pub reason: String,
}

impl SkippedSegment {
    pub fn new(segment: usize, reason: impl Into<String>) -> Self {
        Self {
            segment,
            reason: reason.into(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunManifest {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub report_title: String,
    pub output: PathBuf,
    /// Total duration of the composed timeline in seconds
    pub total_duration: f64,
    pub placements: Vec<TimelinePlacement>,
    #[serde(default)]
    pub skipped: Vec<SkippedSegment>,
}

impl RunManifest {
    /// Segments that made it into the final video.
    pub fn included_segments(&self) -> Vec<usize> {
        self.placements.iter().map(|p| p.segment).collect()
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
