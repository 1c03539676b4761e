//! Timeline composition: per-segment outcomes to a render-ready plan.
//!
//! Failed segments are dropped (or filled, when a single narration track
//! must keep playing) and the survivors are re-scheduled with the same gap,
//! so the rendered timeline never carries a hole where a segment used to be.

use tracing::warn;

use nclip_media::{AudioLayout, CompositionPlan, PlannedSegment, VisualSource};
use nclip_models::{
    AudioAsset, CaptionCue, OutputFormat, ProcessedVisualAsset, Segment, SkippedSegment,
    TimelinePlacement, WordToken,
};

use crate::captions;
use crate::error::{PipelineError, PipelineResult};
use crate::scheduler::schedule;

/// Result of the segment-level stages for one segment.
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    Ready {
        segment: Segment,
        /// Narration length the visual has to cover
        slot: f64,
        /// Per-segment narration; absent in single-track mode
        audio: Option<AudioAsset>,
        visual: ProcessedVisualAsset,
        /// Transcribed words in segment-local time
        words: Vec<WordToken>,
    },
    Failed {
        segment: Segment,
        /// Known whenever narration succeeded
        slot: Option<f64>,
        reason: String,
    },
}

impl SegmentOutcome {
    pub fn failed(segment: Segment, slot: Option<f64>, error: &PipelineError) -> Self {
        SegmentOutcome::Failed {
            segment,
            slot,
            reason: error.to_string(),
        }
    }

    pub fn order(&self) -> usize {
        match self {
            SegmentOutcome::Ready { segment, .. } | SegmentOutcome::Failed { segment, .. } => segment.order,
        }
    }
}

/// A laid-out plan plus the segments that did not make it.
#[derive(Debug, Clone)]
pub struct ComposedTimeline {
    pub plan: CompositionPlan,
    pub skipped: Vec<SkippedSegment>,
}

impl ComposedTimeline {
    pub fn placements(&self) -> Vec<TimelinePlacement> {
        self.plan.segments.iter().map(|s| s.placement).collect()
    }
}

/// Builds composition plans from segment outcomes.
#[derive(Debug, Clone)]
pub struct Compositor {
    pub format: OutputFormat,
    pub gap: f64,
    pub max_words_per_cue: usize,
    pub tolerance: f64,
}

impl Compositor {
    /// Reject a visual that does not cover its slot.
    fn check_duration(&self, visual: &ProcessedVisualAsset, slot: f64) -> PipelineResult<()> {
        let drift = visual.drift_from(slot);
        if drift > self.tolerance {
            return Err(PipelineError::DurationInvariant {
                segment: visual.segment,
                expected: slot,
                actual: visual.duration,
                tolerance: self.tolerance,
            });
        }
        Ok(())
    }

    /// Each segment carries its own narration; failed segments are skipped.
    pub fn plan_per_segment(&self, mut outcomes: Vec<SegmentOutcome>) -> PipelineResult<ComposedTimeline> {
        outcomes.sort_by_key(SegmentOutcome::order);

        let mut skipped = Vec::new();
        let mut ready = Vec::new();

        for outcome in outcomes {
            match outcome {
                SegmentOutcome::Ready {
                    segment,
                    slot,
                    audio: Some(audio),
                    visual,
                    words,
                } => match self.check_duration(&visual, slot) {
                    Ok(()) => ready.push((segment, audio, visual, words)),
                    Err(e) => skipped.push(skip(segment.order, e.to_string())),
                },
                SegmentOutcome::Ready { segment, .. } => {
                    skipped.push(skip(segment.order, "narration audio missing".to_string()))
                }
                SegmentOutcome::Failed { segment, reason, .. } => skipped.push(skip(segment.order, reason)),
            }
        }

        if ready.is_empty() {
            return Err(PipelineError::composition(format!(
                "all {} segments failed",
                skipped.len()
            )));
        }

        let durations: Vec<(usize, f64)> = ready.iter().map(|(s, a, _, _)| (s.order, a.duration)).collect();
        let placements = schedule(&durations, self.gap)?;

        let mut segments = Vec::with_capacity(ready.len());
        let mut cues: Vec<CaptionCue> = Vec::new();
        for ((segment, audio, visual, words), placement) in ready.into_iter().zip(placements) {
            cues.extend(captions::segment_captions(
                &segment.text,
                &words,
                self.max_words_per_cue,
                &placement,
            )?);
            segments.push(PlannedSegment {
                placement,
                visual: VisualSource::Clip(visual),
                audio: Some(audio),
            });
        }

        Ok(ComposedTimeline {
            plan: CompositionPlan {
                format: self.format,
                gap: self.gap,
                audio: AudioLayout::PerSegment,
                segments,
                captions: cues,
            },
            skipped,
        })
    }

    /// One narration track spans the timeline; a failed visual is replaced by
    /// a black filler of the same length so audio and picture stay in sync.
    ///
    /// `words` are in narration-track time.
    pub fn plan_single_track(
        &self,
        mut outcomes: Vec<SegmentOutcome>,
        narration: AudioAsset,
        script: &str,
        words: &[WordToken],
    ) -> PipelineResult<ComposedTimeline> {
        outcomes.sort_by_key(SegmentOutcome::order);

        let mut skipped = Vec::new();
        let mut slots = Vec::with_capacity(outcomes.len());
        let mut visuals = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            match outcome {
                SegmentOutcome::Ready { segment, slot, visual, .. } => match self.check_duration(&visual, slot) {
                    Ok(()) => {
                        slots.push((segment.order, slot));
                        visuals.push(VisualSource::Clip(visual));
                    }
                    Err(e) => {
                        skipped.push(skip(segment.order, format!("replaced by filler: {e}")));
                        slots.push((segment.order, slot));
                        visuals.push(VisualSource::Filler);
                    }
                },
                SegmentOutcome::Failed {
                    segment,
                    slot: Some(slot),
                    reason,
                } => {
                    skipped.push(skip(segment.order, format!("replaced by filler: {reason}")));
                    slots.push((segment.order, slot));
                    visuals.push(VisualSource::Filler);
                }
                SegmentOutcome::Failed { segment, slot: None, reason } => {
                    return Err(PipelineError::composition(format!(
                        "segment {} has no narration slot: {reason}",
                        segment.order
                    )));
                }
            }
        }

        if !visuals.iter().any(|v| matches!(v, VisualSource::Clip(_))) {
            return Err(PipelineError::composition(format!(
                "all {} visuals failed",
                visuals.len()
            )));
        }

        let placements = schedule(&slots, 0.0)?;
        let total = placements.last().map(|p| p.end).unwrap_or(0.0);
        let whole = TimelinePlacement::new(0, 0.0, total);
        let cues = captions::segment_captions(script, words, self.max_words_per_cue, &whole)?;

        let segments = placements
            .into_iter()
            .zip(visuals)
            .map(|(placement, visual)| PlannedSegment {
                placement,
                visual,
                audio: None,
            })
            .collect();

        Ok(ComposedTimeline {
            plan: CompositionPlan {
                format: self.format,
                gap: 0.0,
                audio: AudioLayout::SingleTrack(narration),
                segments,
                captions: cues,
            },
            skipped,
        })
    }
}

fn skip(segment: usize, reason: String) -> SkippedSegment {
    warn!(segment, "Segment excluded from composition: {}", reason);
    metrics::counter!("nclip_segments_skipped_total").increment(1);
    SkippedSegment::new(segment, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compositor() -> Compositor {
        Compositor {
            format: OutputFormat::default(),
            gap: 0.1,
            max_words_per_cue: 4,
            tolerance: 0.05,
        }
    }

    fn segment(order: usize) -> Segment {
        Segment::new(order, format!("Segment nummer {order}."), "prompt").unwrap()
    }

    fn ready(order: usize, duration: f64) -> SegmentOutcome {
        SegmentOutcome::Ready {
            segment: segment(order),
            slot: duration,
            audio: Some(AudioAsset::new(order, format!("audio/subarticle_{order}.mp3"), duration).unwrap()),
            visual: ProcessedVisualAsset::new(order, format!("clips/processed_{order}.mp4"), duration).unwrap(),
            words: vec![
                WordToken::new("Segment", 0.0, 0.4),
                WordToken::new("nummer", 0.5, 0.9),
                WordToken::new("x.", 1.0, 1.3),
            ],
        }
    }

    fn failed(order: usize, slot: Option<f64>) -> SegmentOutcome {
        SegmentOutcome::Failed {
            segment: segment(order),
            slot,
            reason: "replicate failed: 500".into(),
        }
    }

    #[test]
    fn test_per_segment_plan_matches_schedule() {
        let timeline = compositor()
            .plan_per_segment(vec![ready(0, 4.0), ready(1, 6.5), ready(2, 3.2)])
            .unwrap();

        let p = timeline.placements();
        assert!((p[1].start - 4.1).abs() < 1e-9);
        assert!((p[2].end - 13.9).abs() < 1e-9);
        assert!(timeline.skipped.is_empty());
        assert!(timeline.plan.validate(0.05).is_ok());
        // Captions are shifted to each segment's start.
        assert!(timeline.plan.captions.iter().any(|c| (c.start - 4.1).abs() < 1e-9));
    }

    #[test]
    fn test_failed_segment_skipped_and_rescheduled() {
        let timeline = compositor()
            .plan_per_segment(vec![ready(2, 3.2), failed(1, Some(6.5)), ready(0, 4.0)])
            .unwrap();

        let p = timeline.placements();
        assert_eq!(p.len(), 2);
        assert_eq!(p[1].segment, 2);
        assert!((p[1].start - 4.1).abs() < 1e-9);
        assert!((p[1].end - 7.3).abs() < 1e-9);
        assert_eq!(timeline.skipped.len(), 1);
        assert_eq!(timeline.skipped[0].segment, 1);
        assert!(timeline.plan.captions.iter().all(|c| c.end <= 7.3 + 1e-9));
    }

    #[test]
    fn test_duration_mismatch_is_skipped() {
        let mut bad = ready(1, 6.5);
        if let SegmentOutcome::Ready { visual, .. } = &mut bad {
            visual.duration = 5.0;
        }
        let timeline = compositor().plan_per_segment(vec![ready(0, 4.0), bad]).unwrap();

        assert_eq!(timeline.placements().len(), 1);
        assert!(timeline.skipped[0].reason.contains("narration lasts"));
    }

    #[test]
    fn test_all_failed_is_composition_error() {
        let err = compositor()
            .plan_per_segment(vec![failed(0, None), failed(1, Some(2.0))])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Composition(_)));
    }

    #[test]
    fn test_single_track_fills_failed_visual() {
        let narration = AudioAsset::new(0, "audio/narration.mp3", 9.0).unwrap();
        let mut first = ready(0, 3.0);
        if let SegmentOutcome::Ready { audio, .. } = &mut first {
            *audio = None;
        }
        let words = vec![WordToken::new("hej", 0.0, 0.5)];
        let timeline = compositor()
            .plan_single_track(vec![first, failed(1, Some(6.0))], narration, "Hej med dig", &words)
            .unwrap();

        assert_eq!(timeline.plan.gap, 0.0);
        assert_eq!(timeline.plan.segments[1].visual, VisualSource::Filler);
        assert!((timeline.placements()[1].start - 3.0).abs() < 1e-9);
        assert!((timeline.plan.total_duration() - 9.0).abs() < 1e-9);
        assert_eq!(timeline.skipped.len(), 1);
        assert_eq!(timeline.plan.captions[0].text, "Hej med dig");
        assert!(timeline.plan.validate(0.05).is_ok());
    }

    #[test]
    fn test_single_track_without_any_visual_fails() {
        let narration = AudioAsset::new(0, "audio/narration.mp3", 4.0).unwrap();
        let err = compositor()
            .plan_single_track(vec![failed(0, Some(4.0))], narration, "x", &[])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Composition(_)));
    }
}
