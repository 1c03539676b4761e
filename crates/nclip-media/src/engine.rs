//! The media seam used by the pipeline, and its FFmpeg implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use nclip_models::{
    EncodingConfig, OutputFormat, ProcessedVisualAsset, RawVisualAsset, TimelinePlacement, VisualKind,
};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::captions::{build_ass_document, CaptionStyle};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{black_source, cover_geometry, silence_source, subtitles_filter, KenBurns};
use crate::fs_utils::PartialOutput;
use crate::probe::{probe_duration, probe_video};
use crate::reconcile::{ReconciliationPlan, SpeedBounds};
use crate::timeline::{AudioLayout, CompositionPlan, PlannedSegment, VisualSource};

/// Default drift allowed between a processed visual and its narration.
pub const DEFAULT_DURATION_TOLERANCE: f64 = 0.05;

/// Local media operations the pipeline depends on.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Playable duration of an audio or video file.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Stretch, loop or animate `raw` so it lasts exactly `target` seconds.
    async fn reconcile(
        &self,
        raw: &RawVisualAsset,
        target: f64,
        output: &Path,
    ) -> MediaResult<ProcessedVisualAsset>;

    /// Render `plan` into a single video at `output`.
    ///
    /// Nothing exists at `output` unless rendering succeeded.
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<PathBuf>;
}

/// [`MediaEngine`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    format: OutputFormat,
    encoding: EncodingConfig,
    bounds: SpeedBounds,
    caption_style: CaptionStyle,
    tolerance: f64,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(OutputFormat::default(), EncodingConfig::default())
    }
}

impl FfmpegEngine {
    pub fn new(format: OutputFormat, encoding: EncodingConfig) -> Self {
        Self {
            format,
            encoding,
            bounds: SpeedBounds::default(),
            caption_style: CaptionStyle::default(),
            tolerance: DEFAULT_DURATION_TOLERANCE,
            timeout_secs: None,
            cancel_rx: None,
        }
    }

    pub fn with_speed_bounds(mut self, bounds: SpeedBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Per-process timeout for every FFmpeg invocation.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        runner
    }

    fn frames_to_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.format.fps as f64
    }

    /// Render one placed segment with its audio into a uniform part file.
    async fn render_segment(
        &self,
        planned: &PlannedSegment,
        layout: &AudioLayout,
        frames: u64,
        output: &Path,
    ) -> MediaResult<()> {
        let duration = self.frames_to_secs(frames);
        let fps = self.format.fps;

        let (cmd, video_chain) = match &planned.visual {
            VisualSource::Clip(clip) => {
                let info = probe_video(&clip.path).await?;
                let cover = cover_geometry(info.width, info.height, self.format.width, self.format.height);
                (FfmpegCommand::new(output).input(&clip.path), cover.filter())
            }
            VisualSource::Filler => (
                FfmpegCommand::new(output).lavfi(black_source(&self.format, duration)),
                "setsar=1".to_string(),
            ),
        };

        let cmd = match (layout, &planned.audio) {
            (AudioLayout::PerSegment, Some(audio)) => cmd.input(&audio.path),
            (AudioLayout::PerSegment, None) => {
                return Err(MediaError::invalid_composition(format!(
                    "segment {} has no narration audio",
                    planned.placement.segment
                )))
            }
            (AudioLayout::SingleTrack(_), _) => cmd.lavfi(silence_source(self.encoding.sample_rate)),
        };

        // Clone the last frame so a clip a few frames short still fills its slot
        let graph = format!(
            "[0:v]{video_chain},fps={fps},tpad=stop_mode=clone:stop_duration=1,format=yuv420p[v];\
             [1:a]apad,aresample={sr}[a]",
            sr = self.encoding.sample_rate
        );

        let cmd = cmd
            .filter_complex(graph)
            .map("[v]")
            .map("[a]")
            .output_args(["-frames:v".to_string(), frames.to_string()])
            .duration(duration)
            .frame_rate(fps)
            .encode(&self.encoding);

        self.runner().run(&cmd).await
    }

    /// Render a black, silent transition of `frames` frames.
    async fn render_gap(&self, frames: u64, output: &Path) -> MediaResult<()> {
        let duration = self.frames_to_secs(frames);
        let cmd = FfmpegCommand::new(output)
            .lavfi(black_source(&self.format, duration))
            .lavfi(silence_source(self.encoding.sample_rate))
            .map("0:v")
            .map("1:a")
            .output_args(["-frames:v".to_string(), frames.to_string()])
            .duration(duration)
            .frame_rate(self.format.fps)
            .encode(&self.encoding);

        self.runner().run(&cmd).await
    }
}

/// Frame-aligned parts of the timeline in playback order.
#[derive(Debug, Clone, PartialEq)]
enum TimelinePart {
    Segment { index: usize, frames: u64 },
    Gap { frames: u64 },
}

/// Cut the plan into frame-aligned parts.
///
/// Each boundary is rounded from its absolute time once, so rounding
/// never accumulates across segments.
fn frame_parts(placements: &[TimelinePlacement], fps: u32) -> Vec<TimelinePart> {
    let mut parts = Vec::with_capacity(placements.len() * 2);
    let mut cursor = 0u64;

    for (index, placement) in placements.iter().enumerate() {
        let (first, last) = placement.frame_range(fps);
        if first > cursor {
            parts.push(TimelinePart::Gap {
                frames: first - cursor,
            });
        }
        let start = first.max(cursor);
        parts.push(TimelinePart::Segment {
            index,
            frames: last.saturating_sub(start).max(1),
        });
        cursor = last.max(start + 1);
    }

    parts
}

/// Concat demuxer list; single quotes in paths are escaped.
fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe_duration(path).await
    }

    async fn reconcile(
        &self,
        raw: &RawVisualAsset,
        target: f64,
        output: &Path,
    ) -> MediaResult<ProcessedVisualAsset> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial = PartialOutput::for_target(output);

        let (plan, cmd) = match raw.kind {
            VisualKind::Video => {
                let raw_duration = match raw.raw_duration {
                    Some(d) => d,
                    None => probe_duration(&raw.path).await?,
                };
                let plan = ReconciliationPlan::for_video(raw_duration, target, &self.bounds)?;
                let cmd = plan.video_command(&raw.path, partial.path(), &self.format, &self.encoding);
                (plan, cmd)
            }
            VisualKind::Image => {
                let plan = ReconciliationPlan::for_image(target)?;
                let motion = KenBurns::for_segment(raw.segment);
                let cmd = plan.image_command(&raw.path, partial.path(), motion, &self.format, &self.encoding);
                (plan, cmd)
            }
        };

        debug!(
            segment = raw.segment,
            kind = %raw.kind,
            speed_factor = plan.speed_factor,
            loop_count = plan.loop_count,
            trim_to = plan.trim_to,
            "Reconciling visual"
        );

        self.runner().run(&cmd).await?;
        let path = partial.finalize().await?;
        let duration = probe_duration(&path).await?;

        metrics::counter!("nclip_reconciled_visuals_total", "kind" => raw.kind.as_str()).increment(1);

        ProcessedVisualAsset::new(raw.segment, path, duration)
            .map_err(|e| MediaError::InvalidMedia(e.to_string()))
    }

    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<PathBuf> {
        let started = Instant::now();
        plan.validate(self.tolerance)?;

        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await?;

        let workdir = tempfile::Builder::new()
            .prefix(".nclip-render-")
            .tempdir_in(&parent)?;

        let placements: Vec<TimelinePlacement> = plan.segments.iter().map(|s| s.placement).collect();
        let parts = frame_parts(&placements, plan.format.fps);

        let mut part_paths = Vec::with_capacity(parts.len());
        let mut gap_files: HashMap<u64, PathBuf> = HashMap::new();

        for part in &parts {
            match part {
                TimelinePart::Segment { index, frames } => {
                    let planned = &plan.segments[*index];
                    let path = workdir.path().join(format!("part_{:03}.mp4", index));
                    self.render_segment(planned, &plan.audio, *frames, &path).await?;
                    debug!(segment = planned.placement.segment, frames, "Rendered segment part");
                    part_paths.push(path);
                }
                TimelinePart::Gap { frames } => {
                    let path = match gap_files.get(frames) {
                        Some(path) => path.clone(),
                        None => {
                            let path = workdir.path().join(format!("gap_{}f.mp4", frames));
                            self.render_gap(*frames, &path).await?;
                            gap_files.insert(*frames, path.clone());
                            path
                        }
                    };
                    part_paths.push(path);
                }
            }
        }

        let list_path = workdir.path().join("parts.txt");
        fs::write(&list_path, concat_list(&part_paths)).await?;

        let joined = workdir.path().join("joined.mp4");
        let concat = FfmpegCommand::new(&joined)
            .input_with(["-f", "concat", "-safe", "0"], &list_path)
            .copy_streams();
        self.runner().run(&concat).await?;

        let partial = PartialOutput::for_target(output);
        let mut cmd = FfmpegCommand::new(partial.path()).input(&joined);

        if let AudioLayout::SingleTrack(track) = &plan.audio {
            cmd = cmd
                .input(&track.path)
                .map("0:v")
                .map("1:a")
                .duration(plan.total_duration());
        }

        if plan.captions.is_empty() {
            cmd = cmd.output_args(["-c:v", "copy"]).output_args(self.encoding.audio_args());
        } else {
            let ass_path = workdir.path().join("captions.ass");
            let doc = build_ass_document(&plan.captions, &plan.format, &self.caption_style);
            fs::write(&ass_path, doc).await?;
            cmd = cmd.video_filter(subtitles_filter(&ass_path)).encode(&self.encoding);
        }

        cmd = cmd.output_args(["-movflags", "+faststart"]);
        self.runner().run(&cmd).await?;
        let path = partial.finalize().await?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("nclip_render_duration_seconds").record(elapsed);
        info!(
            output = %path.display(),
            segments = plan.segments.len(),
            captions = plan.captions.len(),
            total_duration = plan.total_duration(),
            elapsed_secs = elapsed,
            "Rendered final video"
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_parts_with_gaps() {
        let placements = vec![
            TimelinePlacement::new(0, 0.0, 4.0),
            TimelinePlacement::new(1, 4.1, 10.6),
            TimelinePlacement::new(2, 10.7, 13.9),
        ];
        let parts = frame_parts(&placements, 30);
        assert_eq!(
            parts,
            vec![
                TimelinePart::Segment { index: 0, frames: 120 },
                TimelinePart::Gap { frames: 3 },
                TimelinePart::Segment { index: 1, frames: 195 },
                TimelinePart::Gap { frames: 3 },
                TimelinePart::Segment { index: 2, frames: 96 },
            ]
        );
        let total: u64 = parts
            .iter()
            .map(|p| match p {
                TimelinePart::Segment { frames, .. } | TimelinePart::Gap { frames } => *frames,
            })
            .sum();
        assert_eq!(total, (13.9f64 * 30.0).round() as u64);
    }

    #[test]
    fn test_frame_parts_without_gap() {
        let placements = vec![
            TimelinePlacement::new(0, 0.0, 3.33),
            TimelinePlacement::new(1, 3.33, 7.0),
        ];
        let parts = frame_parts(&placements, 30);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| matches!(p, TimelinePart::Segment { .. })));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/it's.mp4")]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/it'\\''s.mp4'\n");
    }

    #[tokio::test]
    async fn test_render_rejects_empty_plan_before_spawning() {
        let engine = FfmpegEngine::default();
        let dir = tempfile::TempDir::new().unwrap();
        let plan = CompositionPlan {
            format: OutputFormat::default(),
            gap: 0.1,
            audio: AudioLayout::PerSegment,
            segments: Vec::new(),
            captions: Vec::new(),
        };
        let out = dir.path().join("final.mp4");
        let err = engine.render(&plan, &out).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidComposition(_)));
        assert!(!out.exists());
    }
}
