//! Pipeline configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nclip_media::SpeedBounds;
use nclip_models::VisualKind;

use crate::error::{PipelineError, PipelineResult};

/// How narration audio is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NarrationMode {
    /// One speech call and one audio file per segment
    #[default]
    PerSegment,
    /// One speech call for the whole script, split by text length
    SingleTrack,
}

impl NarrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationMode::PerSegment => "per_segment",
            NarrationMode::SingleTrack => "single_track",
        }
    }
}

impl fmt::Display for NarrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NarrationMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "per_segment" => Ok(NarrationMode::PerSegment),
            "single_track" => Ok(NarrationMode::SingleTrack),
            other => Err(PipelineError::config(format!(
                "unknown narration mode '{other}', expected per_segment or single_track"
            ))),
        }
    }
}

/// Pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root of the on-disk cache and final output
    pub output_dir: PathBuf,
    /// Reuse artifacts from a previous run instead of regenerating them
    pub reuse_existing: bool,
    /// Black transition between segments, in seconds
    pub transition_gap: f64,
    pub max_words_per_cue: usize,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Allowed drift between a processed visual and its narration
    pub duration_tolerance: f64,
    /// Concurrent visual generation calls
    pub visual_workers: usize,
    /// Concurrent speech synthesis calls
    pub speech_workers: usize,
    /// Per-call timeout for external collaborators
    pub call_timeout: Duration,
    /// Retries after the first attempt of an external call
    pub call_retries: u32,
    pub retry_base_delay: Duration,
    /// Timeout for a single FFmpeg process
    pub ffmpeg_timeout: Duration,
    pub video_model: String,
    pub visual_kind: VisualKind,
    pub narration: NarrationMode,
    /// Narration language passed to transcription
    pub language: String,
    pub whisper_model: String,
    pub gemini_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("PipelineConfig")
            .field("output_dir", &self.output_dir)
            .field("reuse_existing", &self.reuse_existing)
            .field("transition_gap", &self.transition_gap)
            .field("max_words_per_cue", &self.max_words_per_cue)
            .field("min_speed", &self.min_speed)
            .field("max_speed", &self.max_speed)
            .field("duration_tolerance", &self.duration_tolerance)
            .field("visual_workers", &self.visual_workers)
            .field("speech_workers", &self.speech_workers)
            .field("call_timeout", &self.call_timeout)
            .field("call_retries", &self.call_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("ffmpeg_timeout", &self.ffmpeg_timeout)
            .field("video_model", &self.video_model)
            .field("visual_kind", &self.visual_kind)
            .field("narration", &self.narration)
            .field("language", &self.language)
            .field("whisper_model", &self.whisper_model)
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("replicate_api_token", &redact(&self.replicate_api_token))
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            reuse_existing: false,
            transition_gap: 0.1,
            max_words_per_cue: 4,
            min_speed: 0.4,
            max_speed: 0.8,
            duration_tolerance: 0.05,
            visual_workers: 3,
            speech_workers: 1,
            call_timeout: Duration::from_secs(300),
            call_retries: 1,
            retry_base_delay: Duration::from_millis(2000),
            ffmpeg_timeout: Duration::from_secs(600),
            video_model: "pixverse".to_string(),
            visual_kind: VisualKind::Video,
            narration: NarrationMode::PerSegment,
            language: "da".to_string(),
            whisper_model: "base".to_string(),
            gemini_api_key: None,
            elevenlabs_api_key: None,
            replicate_api_token: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup; unset or unparsable numeric
    /// values fall back to defaults, unknown enum values are errors.
    pub fn from_lookup<F>(lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let int = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let visual_kind: VisualKind = match text("NCLIP_VISUAL_KIND") {
            Some(v) => v.parse().map_err(|e| PipelineError::config(format!("{e}")))?,
            None => defaults.visual_kind,
        };
        let narration: NarrationMode = match text("NCLIP_NARRATION") {
            Some(v) => v.parse()?,
            None => defaults.narration,
        };

        Ok(Self {
            output_dir: text("NCLIP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            reuse_existing: false,
            transition_gap: num("NCLIP_TRANSITION_GAP").unwrap_or(defaults.transition_gap),
            max_words_per_cue: int("NCLIP_MAX_WORDS_PER_CUE")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_words_per_cue),
            min_speed: num("NCLIP_MIN_SPEED").unwrap_or(defaults.min_speed),
            max_speed: num("NCLIP_MAX_SPEED").unwrap_or(defaults.max_speed),
            duration_tolerance: num("NCLIP_DURATION_TOLERANCE").unwrap_or(defaults.duration_tolerance),
            visual_workers: int("NCLIP_VISUAL_WORKERS")
                .map(|v| v as usize)
                .unwrap_or(defaults.visual_workers),
            speech_workers: int("NCLIP_SPEECH_WORKERS")
                .map(|v| v as usize)
                .unwrap_or(defaults.speech_workers),
            call_timeout: int("NCLIP_CALL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            call_retries: int("NCLIP_CALL_RETRIES")
                .map(|v| v as u32)
                .unwrap_or(defaults.call_retries),
            retry_base_delay: int("NCLIP_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            ffmpeg_timeout: int("NCLIP_FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            video_model: text("NCLIP_VIDEO_MODEL").unwrap_or(defaults.video_model),
            visual_kind,
            narration,
            language: text("NCLIP_LANGUAGE").unwrap_or(defaults.language),
            whisper_model: text("NCLIP_WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            gemini_api_key: text("GEMINI_API_KEY"),
            elevenlabs_api_key: text("ELEVENLABS_API_KEY"),
            replicate_api_token: text("REPLICATE_API_TOKEN"),
        })
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.transition_gap.is_finite() && self.transition_gap >= 0.0) {
            return Err(PipelineError::config(format!(
                "transition gap must be >= 0, got {}",
                self.transition_gap
            )));
        }
        if self.max_words_per_cue == 0 {
            return Err(PipelineError::config("max words per cue must be at least 1"));
        }
        if self.visual_workers == 0 || self.speech_workers == 0 {
            return Err(PipelineError::config("worker counts must be at least 1"));
        }
        if !(self.duration_tolerance.is_finite() && self.duration_tolerance >= 0.0) {
            return Err(PipelineError::config("duration tolerance must be >= 0"));
        }
        self.speed_bounds()?;
        Ok(())
    }

    /// Playback rate bounds for the reconciler.
    pub fn speed_bounds(&self) -> PipelineResult<SpeedBounds> {
        SpeedBounds::new(self.min_speed, self.max_speed).map_err(|e| PipelineError::config(e.to_string()))
    }

    /// Gap actually inserted between segments. Single-track narration is continuous.
    pub fn effective_gap(&self) -> f64 {
        match self.narration {
            NarrationMode::PerSegment => self.transition_gap,
            NarrationMode::SingleTrack => 0.0,
        }
    }

    pub fn require_key<'a>(key: &'a Option<String>, name: &str) -> PipelineResult<&'a str> {
        key.as_deref()
            .ok_or_else(|| PipelineError::config(format!("{name} not set")))
    }
}
