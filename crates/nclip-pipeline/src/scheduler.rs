//! Segment scheduling: absolute placements from narration durations.

use nclip_models::TimelinePlacement;

use crate::error::{PipelineError, PipelineResult};

/// Lay segments end to end with `gap` seconds between consecutive ones.
///
/// `durations` pairs a segment index with its narration length and must
/// already be in narrative order.
pub fn schedule(durations: &[(usize, f64)], gap: f64) -> PipelineResult<Vec<TimelinePlacement>> {
    if !(gap.is_finite() && gap >= 0.0) {
        return Err(PipelineError::config(format!("transition gap must be >= 0, got {gap}")));
    }

    let mut placements = Vec::with_capacity(durations.len());
    let mut cursor = 0.0;

    for (i, &(segment, duration)) in durations.iter().enumerate() {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(PipelineError::composition(format!(
                "segment {segment} has invalid narration duration {duration}"
            )));
        }
        if i > 0 {
            cursor += gap;
        }
        let start = cursor;
        cursor += duration;
        placements.push(TimelinePlacement::new(segment, start, cursor));
    }

    Ok(placements)
}

/// Total timeline length: sum of durations plus `(n - 1)` gaps.
pub fn timeline_length(durations: &[f64], gap: f64) -> f64 {
    let sum: f64 = durations.iter().sum();
    sum + gap * durations.len().saturating_sub(1) as f64
}

/// Split `total` seconds across segments in proportion to their text length.
///
/// Falls back to an equal split when every text is empty.
pub fn proportional_durations(lengths: &[usize], total: f64) -> Vec<f64> {
    if lengths.is_empty() {
        return Vec::new();
    }
    let sum: usize = lengths.iter().sum();
    if sum == 0 {
        let each = total / lengths.len() as f64;
        return vec![each; lengths.len()];
    }
    lengths
        .iter()
        .map(|&len| len as f64 / sum as f64 * total)
        .collect()
}
