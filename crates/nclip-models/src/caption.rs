//! Word tokens from transcription and the caption cues built from them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A transcribed word with timing local to its segment's audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordToken {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl WordToken {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Whether the token text closes a sentence.
    pub fn ends_sentence(&self) -> bool {
        self.text.trim_end().ends_with(&['.', '!', '?'][..])
    }
}

/// A single caption display event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionCue {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl CaptionCue {
    /// Build a cue, enforcing `start < end`.
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> ModelResult<Self> {
        if !(start.is_finite() && end.is_finite()) || start >= end {
            return Err(ModelError::InvalidInterval { start, end });
        }
        Ok(Self {
            text: text.into(),
            start,
            end,
        })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Shift the cue by `offset` seconds.
    pub fn offset(&self, offset: f64) -> Self {
        Self {
            text: self.text.clone(),
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}
