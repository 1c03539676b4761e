//! Media artifacts owned by a single segment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{require_positive, ModelResult};

/// Kind of visual a generation model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    /// Short generated clip with a known raw duration
    #[default]
    Video,
    /// Static image animated to cover the narration
    Image,
}

impl VisualKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualKind::Video => "video",
            VisualKind::Image => "image",
        }
    }

    /// File extension used for the raw artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            VisualKind::Video => "mp4",
            VisualKind::Image => "png",
        }
    }
}

impl fmt::Display for VisualKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown visual kind '{0}', expected 'video' or 'image'")]
pub struct VisualKindParseError(String);

impl FromStr for VisualKind {
    type Err = VisualKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(VisualKind::Video),
            "image" => Ok(VisualKind::Image),
            other => Err(VisualKindParseError(other.to_string())),
        }
    }
}

/// Narration audio for one segment.
///
/// `duration` is probed from the file and is the authoritative target
/// for the segment's visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioAsset {
    pub segment: usize,
    pub path: PathBuf,
    pub duration: f64,
}

impl AudioAsset {
    pub fn new(segment: usize, path: impl Into<PathBuf>, duration: f64) -> ModelResult<Self> {
        Ok(Self {
            segment,
            path: path.into(),
            duration: require_positive("audio duration", duration)?,
        })
    }
}

/// Visual as returned by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawVisualAsset {
    pub segment: usize,
    pub path: PathBuf,
    pub kind: VisualKind,
    /// Playable length of a video; `None` for a static image
    pub raw_duration: Option<f64>,
}

impl RawVisualAsset {
    pub fn video(segment: usize, path: impl Into<PathBuf>, raw_duration: f64) -> ModelResult<Self> {
        Ok(Self {
            segment,
            path: path.into(),
            kind: VisualKind::Video,
            raw_duration: Some(require_positive("raw visual duration", raw_duration)?),
        })
    }

    pub fn image(segment: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            segment,
            path: path.into(),
            kind: VisualKind::Image,
            raw_duration: None,
        }
    }
}

/// Visual stretched, looped and trimmed to the segment's audio duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessedVisualAsset {
    pub segment: usize,
    pub path: PathBuf,
    pub duration: f64,
}

impl ProcessedVisualAsset {
    pub fn new(segment: usize, path: impl Into<PathBuf>, duration: f64) -> ModelResult<Self> {
        Ok(Self {
            segment,
            path: path.into(),
            duration: require_positive("processed visual duration", duration)?,
        })
    }

    /// Absolute difference from the target narration duration.
    pub fn drift_from(&self, target: f64) -> f64 {
        (self.duration - target).abs()
    }

    /// Whether this visual covers `audio` within `tolerance` seconds.
    pub fn matches(&self, audio: &AudioAsset, tolerance: f64) -> bool {
        self.drift_from(audio.duration) <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelError;

    #[test]
    fn test_audio_rejects_non_positive_duration() {
        assert!(matches!(
            AudioAsset::new(0, "a.mp3", 0.0),
            Err(ModelError::InvalidDuration { .. })
        ));
        assert!(AudioAsset::new(0, "a.mp3", f64::NAN).is_err());
        assert!(AudioAsset::new(0, "a.mp3", 4.2).is_ok());
    }

    #[test]
    fn test_processed_matches_within_tolerance() {
        let audio = AudioAsset::new(1, "a.mp3", 12.0).unwrap();
        let close = ProcessedVisualAsset::new(1, "p.mp4", 12.03).unwrap();
        let far = ProcessedVisualAsset::new(1, "p.mp4", 11.5).unwrap();
        assert!(close.matches(&audio, 0.05));
        assert!(!far.matches(&audio, 0.05));
    }

    #[test]
    fn test_visual_kind_parse() {
        assert_eq!("Image".parse::<VisualKind>().unwrap(), VisualKind::Image);
        assert_eq!(VisualKind::Video.extension(), "mp4");
        assert!("gif".parse::<VisualKind>().is_err());
    }
}
