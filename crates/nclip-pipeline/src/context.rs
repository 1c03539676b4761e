//! Explicit run context: configuration, cache policy and collaborator handles.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use nclip_media::{check_ffmpeg, check_ffprobe, FfmpegEngine, MediaEngine};
use nclip_models::{EncodingConfig, OutputFormat, VisualKind};

use crate::cache::{CacheLayout, CachePolicy};
use crate::collaborators::{
    ReportRanker, ReportSource, Segmenter, SpeechSynthesizer, Transcriber, VisualGenerator,
};
use crate::config::PipelineConfig;
use crate::elevenlabs::ElevenLabsClient;
use crate::error::PipelineResult;
use crate::gemini::GeminiClient;
use crate::replicate::{ModelSpec, ReplicateClient};
use crate::reports::JsonReportSource;
use crate::retry::{CallPolicy, RetryConfig};
use crate::whisper::WhisperCli;

/// Handles to every external collaborator.
#[derive(Clone)]
pub struct Collaborators {
    pub reports: Arc<dyn ReportSource>,
    pub ranker: Arc<dyn ReportRanker>,
    pub segmenter: Arc<dyn Segmenter>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub visuals: Arc<dyn VisualGenerator>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// Everything a run needs, passed explicitly to each stage.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub format: OutputFormat,
    pub layout: CacheLayout,
    pub cache: CachePolicy,
    pub calls: CallPolicy,
    pub engine: Arc<dyn MediaEngine>,
    pub collaborators: Collaborators,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        engine: Arc<dyn MediaEngine>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let calls = CallPolicy::new(
            config.call_timeout,
            RetryConfig::default()
                .with_max_retries(config.call_retries)
                .with_base_delay(config.retry_base_delay),
        );
        Ok(Self {
            layout: CacheLayout::new(&config.output_dir),
            cache: CachePolicy::new(config.reuse_existing),
            format: OutputFormat::default(),
            calls,
            engine,
            collaborators,
            config,
        })
    }

    /// Wire up the production clients and the FFmpeg engine.
    ///
    /// Flipping `cancel` to `true` kills any running FFmpeg process.
    pub fn from_config(
        config: PipelineConfig,
        reports_path: &Path,
        cancel: watch::Receiver<bool>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        check_ffmpeg()?;
        check_ffprobe()?;

        let gemini = Arc::new(GeminiClient::new(PipelineConfig::require_key(
            &config.gemini_api_key,
            "GEMINI_API_KEY",
        )?));
        let speech = ElevenLabsClient::new(PipelineConfig::require_key(
            &config.elevenlabs_api_key,
            "ELEVENLABS_API_KEY",
        )?);
        let spec = match config.visual_kind {
            VisualKind::Video => ModelSpec::video(&config.video_model)?,
            VisualKind::Image => ModelSpec::image(),
        };
        info!(model = spec.model, kind = %spec.kind, "Visual model selected");
        let visuals = ReplicateClient::new(
            PipelineConfig::require_key(&config.replicate_api_token, "REPLICATE_API_TOKEN")?,
            spec,
        );
        let transcriber = WhisperCli::new(&config.whisper_model, &config.language)?;

        let engine = FfmpegEngine::new(OutputFormat::default(), EncodingConfig::default())
            .with_speed_bounds(config.speed_bounds()?)
            .with_tolerance(config.duration_tolerance)
            .with_timeout(config.ffmpeg_timeout.as_secs())
            .with_cancel(cancel);

        let collaborators = Collaborators {
            reports: Arc::new(JsonReportSource::new(reports_path)),
            ranker: gemini.clone(),
            segmenter: gemini,
            speech: Arc::new(speech),
            visuals: Arc::new(visuals),
            transcriber: Arc::new(transcriber),
        };

        Self::new(config, collaborators, Arc::new(engine))
    }
}
