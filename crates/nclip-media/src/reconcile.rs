//! Duration reconciliation: make a visual cover its narration exactly.
//!
//! A plan is computed from durations alone and then applied with FFmpeg.
//! Playing the raw clip at `speed_factor` for `loop_count` repetitions and
//! trimming to `trim_to` yields exactly the target duration.

use std::path::Path;

use nclip_models::{EncodingConfig, OutputFormat};
use serde::{Deserialize, Serialize};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::{slow_motion_filter, KenBurns};

/// Default slowest playback rate.
pub const DEFAULT_MIN_SPEED: f64 = 0.4;
/// Default fastest playback rate. Below 1.0 so clips are never sped up.
pub const DEFAULT_MAX_SPEED: f64 = 0.8;

/// Allowed playback rate range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for SpeedBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_SPEED,
            max: DEFAULT_MAX_SPEED,
        }
    }
}

impl SpeedBounds {
    pub fn new(min: f64, max: f64) -> MediaResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            return Err(MediaError::invalid_plan(format!(
                "speed bounds must satisfy 0 < min <= max, got [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }
}

/// How to turn a raw visual into one of exactly `trim_to` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub speed_factor: f64,
    pub loop_count: u32,
    pub trim_to: f64,
}

impl ReconciliationPlan {
    /// Plan for a video clip of `raw` seconds covering `target` seconds.
    pub fn for_video(raw: f64, target: f64, bounds: &SpeedBounds) -> MediaResult<Self> {
        if !(target.is_finite() && target > 0.0) {
            return Err(MediaError::invalid_plan(format!(
                "target duration must be positive, got {target}"
            )));
        }
        if !(raw.is_finite() && raw > 0.0) {
            return Err(MediaError::invalid_plan(format!(
                "raw duration must be positive, got {raw}"
            )));
        }

        let speed_factor = (raw / target).clamp(bounds.min, bounds.max);
        let stretched = raw / speed_factor;

        // Tolerate float noise when the stretch lands exactly on target
        let loop_count = if stretched + 1e-9 < target {
            (target / stretched).ceil() as u32
        } else {
            1
        };

        Ok(Self {
            speed_factor,
            loop_count,
            trim_to: target,
        })
    }

    /// Plan for a still image shown for `target` seconds.
    pub fn for_image(target: f64) -> MediaResult<Self> {
        if !(target.is_finite() && target > 0.0) {
            return Err(MediaError::invalid_plan(format!(
                "target duration must be positive, got {target}"
            )));
        }
        Ok(Self {
            speed_factor: 1.0,
            loop_count: 1,
            trim_to: target,
        })
    }

    /// Length of `loop_count` stretched repetitions before trimming.
    pub fn stretched_total(&self, raw: f64) -> f64 {
        self.loop_count as f64 * raw / self.speed_factor
    }

    /// Playable duration produced by applying this plan to a `raw`-second clip.
    pub fn simulated_duration(&self, raw: f64) -> f64 {
        self.stretched_total(raw).min(self.trim_to)
    }

    /// FFmpeg command applying this plan to a video clip.
    ///
    /// The output has no audio and a constant frame rate.
    pub fn video_command(
        &self,
        input: &Path,
        output: &Path,
        format: &OutputFormat,
        encoding: &EncodingConfig,
    ) -> FfmpegCommand {
        let loops = self.loop_count.saturating_sub(1);
        FfmpegCommand::new(output)
            .input_with(["-stream_loop".to_string(), loops.to_string()], input)
            .video_filter(format!(
                "{},fps={}",
                slow_motion_filter(self.speed_factor),
                format.fps
            ))
            .duration(self.trim_to)
            .frame_rate(format.fps)
            .no_audio()
            .encode_video(encoding)
    }

    /// FFmpeg command animating a still image for `trim_to` seconds.
    pub fn image_command(
        &self,
        input: &Path,
        output: &Path,
        motion: KenBurns,
        format: &OutputFormat,
        encoding: &EncodingConfig,
    ) -> FfmpegCommand {
        FfmpegCommand::new(output)
            .input(input)
            .video_filter(motion.filter(self.trim_to, format))
            .duration(self.trim_to)
            .frame_rate(format.fps)
            .no_audio()
            .encode_video(encoding)
    }
}

/// Check a processed duration against its target.
pub fn within_tolerance(actual: f64, target: f64, tolerance: f64) -> bool {
    (actual - target).abs() <= tolerance
}
