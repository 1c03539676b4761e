//! Narration segments derived from the selected report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{require_text, ModelError, ModelResult};

/// Fewest segments a report may be split into.
pub const MIN_SEGMENTS: usize = 3;
/// Most segments a report may be split into.
pub const MAX_SEGMENTS: usize = 8;

/// Unvalidated segment as returned by the segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentDraft {
    pub text: String,
    #[serde(alias = "video_prompt", alias = "image_prompt")]
    pub visual_prompt: String,
}

/// One narrated unit of the final video.
///
/// `order` is the 0-based position in the narrative and is preserved
/// through every later stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub order: usize,
    pub text: String,
    pub visual_prompt: String,
}

impl Segment {
    pub fn new(
        order: usize,
        text: impl Into<String>,
        visual_prompt: impl Into<String>,
    ) -> ModelResult<Self> {
        Ok(Self {
            order,
            text: require_text("text", text)?,
            visual_prompt: require_text("visual_prompt", visual_prompt)?,
        })
    }

    /// Validate a segmenter response and assign narrative order.
    pub fn from_drafts(drafts: Vec<SegmentDraft>) -> ModelResult<Vec<Self>> {
        let count = drafts.len();
        if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&count) {
            return Err(ModelError::SegmentCount {
                count,
                min: MIN_SEGMENTS,
                max: MAX_SEGMENTS,
            });
        }

        drafts
            .into_iter()
            .enumerate()
            .map(|(order, draft)| Self::new(order, draft.text, draft.visual_prompt))
            .collect()
    }

    /// Number of characters of narration, used for proportional timing.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}
