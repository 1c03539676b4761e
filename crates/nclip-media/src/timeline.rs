//! Composition plans: everything the renderer needs, already laid out.
//!
//! Plans are built by the caller (skips and re-scheduling happen there) and
//! validated here before any FFmpeg process is spawned.

use nclip_models::{AudioAsset, CaptionCue, OutputFormat, ProcessedVisualAsset, TimelinePlacement};

use crate::error::{MediaError, MediaResult};

/// Slack allowed when checking that placements chain with the gap.
const PLACEMENT_EPSILON: f64 = 1e-6;

/// Visual layer of one placed segment.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualSource {
    Clip(ProcessedVisualAsset),
    /// Neutral black frame, used when the visual is missing but the audio must play
    Filler,
}

/// How narration audio is laid over the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioLayout {
    /// Each segment carries its own narration
    PerSegment,
    /// One narration track spans the whole timeline
    SingleTrack(AudioAsset),
}

/// A segment at its final position.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub placement: TimelinePlacement,
    pub visual: VisualSource,
    /// Required for [`AudioLayout::PerSegment`]
    pub audio: Option<AudioAsset>,
}

/// A complete, render-ready timeline.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub format: OutputFormat,
    /// Neutral transition between consecutive segments, in seconds
    pub gap: f64,
    pub audio: AudioLayout,
    pub segments: Vec<PlannedSegment>,
    /// Timeline-absolute captions
    pub captions: Vec<CaptionCue>,
}

impl CompositionPlan {
    /// End of the last segment.
    pub fn total_duration(&self) -> f64 {
        self.segments.last().map(|s| s.placement.end).unwrap_or(0.0)
    }

    /// Check the plan's structural invariants.
    ///
    /// `tolerance` bounds how far a clip's duration may drift from its slot.
    pub fn validate(&self, tolerance: f64) -> MediaResult<()> {
        let first = self
            .segments
            .first()
            .ok_or_else(|| MediaError::invalid_composition("no segments to compose"))?;

        if !(self.gap.is_finite() && self.gap >= 0.0) {
            return Err(MediaError::invalid_composition(format!(
                "transition gap must be non-negative, got {}",
                self.gap
            )));
        }

        if first.placement.start.abs() > PLACEMENT_EPSILON {
            return Err(MediaError::invalid_composition(format!(
                "timeline must start at 0, starts at {}",
                first.placement.start
            )));
        }

        for pair in self.segments.windows(2) {
            let (prev, next) = (&pair[0].placement, &pair[1].placement);
            if next.segment <= prev.segment {
                return Err(MediaError::invalid_composition(format!(
                    "segment {} placed after segment {}",
                    next.segment, prev.segment
                )));
            }
            let gap = next.start - prev.end;
            if (gap - self.gap).abs() > PLACEMENT_EPSILON {
                return Err(MediaError::invalid_composition(format!(
                    "gap between segments {} and {} is {:.6}s, expected {:.6}s",
                    prev.segment, next.segment, gap, self.gap
                )));
            }
        }

        for planned in &self.segments {
            let slot = planned.placement.duration();
            if slot <= 0.0 {
                return Err(MediaError::invalid_composition(format!(
                    "segment {} has empty placement",
                    planned.placement.segment
                )));
            }
            if let VisualSource::Clip(clip) = &planned.visual {
                if clip.drift_from(slot) > tolerance {
                    return Err(MediaError::invalid_composition(format!(
                        "segment {} visual lasts {:.3}s for a {:.3}s slot",
                        planned.placement.segment, clip.duration, slot
                    )));
                }
            }
            if matches!(self.audio, AudioLayout::PerSegment) && planned.audio.is_none() {
                return Err(MediaError::invalid_composition(format!(
                    "segment {} has no narration audio",
                    planned.placement.segment
                )));
            }
        }

        for pair in self.captions.windows(2) {
            if pair[1].start < pair[0].start {
                return Err(MediaError::invalid_composition(format!(
                    "caption '{}' starts before the caption preceding it",
                    pair[1].text
                )));
            }
            if pair[0].end - pair[1].start > PLACEMENT_EPSILON {
                return Err(MediaError::invalid_composition(format!(
                    "caption '{}' overlaps '{}' by {:.3}s",
                    pair[0].text,
                    pair[1].text,
                    pair[0].end - pair[1].start
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(segment: usize, start: f64, end: f64) -> PlannedSegment {
        PlannedSegment {
            placement: TimelinePlacement::new(segment, start, end),
            visual: VisualSource::Clip(
                ProcessedVisualAsset::new(segment, format!("processed_{segment}.mp4"), end - start).unwrap(),
            ),
            audio: Some(AudioAsset::new(segment, format!("subarticle_{segment}.mp3"), end - start).unwrap()),
        }
    }

    fn plan(segments: Vec<PlannedSegment>, gap: f64) -> CompositionPlan {
        CompositionPlan {
            format: OutputFormat::default(),
            gap,
            audio: AudioLayout::PerSegment,
            segments,
            captions: Vec::new(),
        }
    }

    #[test]
    fn test_valid_plan() {
        let p = plan(
            vec![planned(0, 0.0, 4.0), planned(1, 4.1, 10.6), planned(2, 10.7, 13.9)],
            0.1,
        );
        p.validate(0.05).unwrap();
        assert!((p.total_duration() - 13.9).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_empty_plan() {
        assert!(matches!(
            plan(Vec::new(), 0.1).validate(0.05),
            Err(MediaError::InvalidComposition(_))
        ));
    }

    #[test]
    fn test_rejects_gap_mismatch() {
        let p = plan(vec![planned(0, 0.0, 4.0), planned(2, 10.7, 13.9)], 0.1);
        assert!(p.validate(0.05).is_err());
    }

    #[test]
    fn test_rejects_drifting_clip() {
        let mut seg = planned(0, 0.0, 4.0);
        seg.visual = VisualSource::Clip(ProcessedVisualAsset::new(0, "p.mp4", 3.5).unwrap());
        assert!(plan(vec![seg], 0.1).validate(0.05).is_err());
    }

    #[test]
    fn test_single_track_allows_filler_without_audio() {
        let track = AudioAsset::new(0, "narration.mp3", 8.0).unwrap();
        let mut a = planned(0, 0.0, 3.0);
        a.audio = None;
        let mut b = planned(1, 3.0, 8.0);
        b.audio = None;
        b.visual = VisualSource::Filler;

        let p = CompositionPlan {
            audio: AudioLayout::SingleTrack(track),
            ..plan(vec![a, b], 0.0)
        };
        p.validate(0.05).unwrap();
    }

    #[test]
    fn test_rejects_overlapping_captions() {
        let mut p = plan(vec![planned(0, 0.0, 4.0)], 0.1);
        p.captions = vec![
            CaptionCue::new("Politiet anholdt.", 0.0, 1.2).unwrap(),
            CaptionCue::new("Han", 0.9, 1.4).unwrap(),
        ];
        assert!(matches!(p.validate(0.05), Err(MediaError::InvalidComposition(_))));

        p.captions[1] = CaptionCue::new("Han", 1.2, 1.4).unwrap();
        p.validate(0.05).unwrap();
    }
}
