//! Run orchestration.
//!
//! Stages run in order: workspace, report selection, segmentation,
//! narration, visuals (generate, reconcile, transcribe), composition.
//! Segment-level failures are recorded and the run continues; only
//! run-level failures abort.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn, Instrument};

use nclip_models::{
    final_video_name, AudioAsset, ProcessedVisualAsset, RawVisualAsset, Report, RunId, RunManifest,
    Segment, VisualKind, WordToken,
};

use crate::cache::{save_json, ArtifactKind, CachedSegments};
use crate::compositor::{ComposedTimeline, Compositor, SegmentOutcome};
use crate::config::NarrationMode;
use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};
use crate::fanout::fork_join;
use crate::logging::{RunLogger, Stage};
use crate::ranking::{rank_reports, select_best};
use crate::scheduler::proportional_durations;

/// Drives one run end to end.
pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Produce one finished video and its manifest.
    pub async fn run(&self) -> PipelineResult<RunManifest> {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id);
        let span = logger.create_span();

        let result = self.run_stages(&run_id, &logger).instrument(span).await;
        if let Err(e) = &result {
            logger.failure(&e.to_string());
        }
        result
    }

    async fn run_stages(&self, run_id: &RunId, logger: &RunLogger) -> PipelineResult<RunManifest> {
        let started_at = Utc::now();
        let config = &self.ctx.config;

        logger.stage_start(Stage::Workspace, &self.ctx.layout.root().display().to_string());
        self.ctx.layout.prepare(config.reuse_existing).await?;

        let report = self.select_report(logger).await?;
        let segments = self.segments_for(&report, logger).await?;

        let timeline = match config.narration {
            NarrationMode::PerSegment => self.per_segment(&segments, logger).await?,
            NarrationMode::SingleTrack => self.single_track(&segments, logger).await?,
        };

        logger.stage_start(Stage::Composition, "rendering final video");
        let output = self
            .ctx
            .layout
            .final_dir()
            .join(final_video_name(0, &report.title));
        let output = self.ctx.engine.render(&timeline.plan, &output).await?;
        logger.stage_done(Stage::Composition, &output.display().to_string());

        let manifest = RunManifest {
            run_id: run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            report_title: report.title.clone(),
            output,
            total_duration: timeline.plan.total_duration(),
            placements: timeline.placements(),
            skipped: timeline.skipped,
        };
        save_json(&self.ctx.layout.manifest(), &manifest).await?;

        info!(
            output = %manifest.output.display(),
            duration_secs = manifest.total_duration,
            included = manifest.placements.len(),
            skipped = manifest.skipped.len(),
            elapsed_secs = manifest.elapsed_secs(),
            "Run complete"
        );
        Ok(manifest)
    }

    /// Ranked reports come from cache when allowed; the best one is used.
    async fn select_report(&self, logger: &RunLogger) -> PipelineResult<Report> {
        logger.stage_start(Stage::Selection, "choosing report");
        let path = self.ctx.layout.report_cache();

        let cached: Option<Vec<Report>> = self.ctx.cache.load_json(ArtifactKind::ReportSelection, &path).await;
        let ranked = match cached {
            Some(ranked) if !ranked.is_empty() => ranked,
            _ => {
                let scraped = self.ctx.collaborators.reports.fetch().await?;
                let ranker = &self.ctx.collaborators.ranker;
                let ranked = self
                    .ctx
                    .calls
                    .call("ranker", || rank_reports(&scraped, ranker.as_ref()))
                    .await?;
                save_json(&path, &ranked).await?;
                ranked
            }
        };

        let best = select_best(ranked)?;
        logger.stage_done(Stage::Selection, &best.title);
        Ok(best)
    }

    async fn segments_for(&self, report: &Report, logger: &RunLogger) -> PipelineResult<Vec<Segment>> {
        logger.stage_start(Stage::Segmentation, "splitting report");
        let path = self.ctx.layout.segments_cache();

        let segments = match self.ctx.cache.load_segments(&path, report).await {
            Some(segments) => segments,
            None => {
                let segmenter = &self.ctx.collaborators.segmenter;
                let drafts = self
                    .ctx
                    .calls
                    .call("segmenter", || segmenter.segment(report))
                    .await?;
                let segments = Segment::from_drafts(drafts)
                    .map_err(|e| PipelineError::upstream("segmenter", e.to_string()))?;
                let cached = CachedSegments {
                    report_url: report.url.clone(),
                    segments,
                };
                save_json(&path, &cached).await?;
                cached.segments
            }
        };

        logger.stage_done(Stage::Segmentation, &format!("{} segments", segments.len()));
        Ok(segments)
    }

    fn compositor(&self) -> Compositor {
        Compositor {
            format: self.ctx.format,
            gap: self.ctx.config.effective_gap(),
            max_words_per_cue: self.ctx.config.max_words_per_cue,
            tolerance: self.ctx.config.duration_tolerance,
        }
    }

    async fn per_segment(&self, segments: &[Segment], logger: &RunLogger) -> PipelineResult<ComposedTimeline> {
        let config = &self.ctx.config;

        logger.stage_start(Stage::Narration, &format!("{} segments", segments.len()));
        let narrations = fork_join(segments, config.speech_workers, |segment| {
            self.narrate(segment.order, &segment.text)
        })
        .await;
        let narrations = abort_on_run_level(narrations)?;
        logger.stage_done(Stage::Narration, "narration ready");

        logger.stage_start(Stage::Visuals, "generating and reconciling visuals");
        let outcomes = fork_join(segments.iter().zip(narrations), config.visual_workers, |(segment, audio)| async move {
            let audio = match audio {
                Ok(audio) => audio,
                Err(e) => return Ok(SegmentOutcome::failed(segment.clone(), None, &e)),
            };
            let slot = audio.duration;
            match self.visual_for(segment, slot).await {
                Ok(visual) => {
                    let words = self.words_for(&audio).await;
                    Ok(SegmentOutcome::Ready {
                        segment: segment.clone(),
                        slot,
                        audio: Some(audio),
                        visual,
                        words,
                    })
                }
                Err(e) if e.is_segment_local() => Ok(SegmentOutcome::failed(segment.clone(), Some(slot), &e)),
                Err(e) => Err(e),
            }
        })
        .await;
        let outcomes = outcomes.into_iter().collect::<PipelineResult<Vec<_>>>()?;
        self.log_failures(&outcomes, logger);
        logger.stage_done(Stage::Visuals, "visual stage joined");

        self.compositor().plan_per_segment(outcomes)
    }

    async fn single_track(&self, segments: &[Segment], logger: &RunLogger) -> PipelineResult<ComposedTimeline> {
        let config = &self.ctx.config;
        let script = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        logger.stage_start(Stage::Narration, "single narration track");
        let narration = self.narrate_track(&script).await?;
        let lengths: Vec<usize> = segments.iter().map(Segment::text_len).collect();
        let slots = proportional_durations(&lengths, narration.duration);
        logger.stage_done(Stage::Narration, &format!("{:.2}s of narration", narration.duration));

        logger.stage_start(Stage::Visuals, "generating and reconciling visuals");
        let outcomes = fork_join(segments.iter().zip(slots), config.visual_workers, |(segment, slot)| async move {
            match self.visual_for(segment, slot).await {
                Ok(visual) => Ok(SegmentOutcome::Ready {
                    segment: segment.clone(),
                    slot,
                    audio: None,
                    visual,
                    words: Vec::new(),
                }),
                Err(e) if e.is_segment_local() => Ok(SegmentOutcome::failed(segment.clone(), Some(slot), &e)),
                Err(e) => Err(e),
            }
        })
        .await;
        let outcomes = outcomes.into_iter().collect::<PipelineResult<Vec<_>>>()?;
        self.log_failures(&outcomes, logger);
        logger.stage_done(Stage::Visuals, "visual stage joined");

        logger.stage_start(Stage::Captions, "transcribing narration track");
        let words = self.words_for(&narration).await;

        self.compositor().plan_single_track(outcomes, narration, &script, &words)
    }

    fn log_failures(&self, outcomes: &[SegmentOutcome], logger: &RunLogger) {
        for outcome in outcomes {
            if let SegmentOutcome::Failed { segment, reason, .. } = outcome {
                logger.segment_skipped(Stage::Visuals, segment.order, reason);
            }
        }
    }

    /// Per-segment narration, reused from disk when allowed.
    async fn narrate(&self, segment: usize, text: &str) -> PipelineResult<AudioAsset> {
        let path = self.ctx.layout.audio(segment);
        self.synthesize_to(segment, text, path).await
    }

    async fn narrate_track(&self, script: &str) -> PipelineResult<AudioAsset> {
        let path = self.ctx.layout.narration();
        self.synthesize_to(0, script, path).await
    }

    async fn synthesize_to(&self, segment: usize, text: &str, path: PathBuf) -> PipelineResult<AudioAsset> {
        let engine = self.ctx.engine.as_ref();
        if let Some(duration) = self.ctx.cache.reuse_media(ArtifactKind::Audio, &path, engine).await {
            return Ok(AudioAsset::new(segment, path, duration)?);
        }

        let speech = &self.ctx.collaborators.speech;
        let written = self
            .ctx
            .calls
            .call("speech", || speech.synthesize(text, &path))
            .await?;
        // Duration always comes from the file, never from the service.
        let duration = engine.probe_duration(&written).await?;
        info!(segment, duration_secs = duration, "Narration ready");
        Ok(AudioAsset::new(segment, written, duration)?)
    }

    /// Raw visual for a segment, from disk or the generator.
    async fn raw_visual(&self, segment: &Segment) -> PipelineResult<RawVisualAsset> {
        let generator = &self.ctx.collaborators.visuals;
        let kind = generator.kind();
        let path = self.ctx.layout.raw_visual(segment.order, kind);
        let engine = self.ctx.engine.as_ref();

        match kind {
            VisualKind::Video => {
                if let Some(d) = self.ctx.cache.reuse_media(ArtifactKind::RawVisual, &path, engine).await {
                    return Ok(RawVisualAsset::video(segment.order, path, d)?);
                }
            }
            VisualKind::Image => {
                if self.ctx.cache.reuse_file(ArtifactKind::RawVisual, &path).await {
                    return Ok(RawVisualAsset::image(segment.order, path));
                }
            }
        }

        let written = self
            .ctx
            .calls
            .call("visuals", || generator.generate(segment, &path))
            .await?;

        match kind {
            VisualKind::Video => {
                let raw_duration = engine.probe_duration(&written).await?;
                Ok(RawVisualAsset::video(segment.order, written, raw_duration)?)
            }
            VisualKind::Image => Ok(RawVisualAsset::image(segment.order, written)),
        }
    }

    /// A processed visual lasting exactly `slot` seconds.
    async fn visual_for(&self, segment: &Segment, slot: f64) -> PipelineResult<ProcessedVisualAsset> {
        let tolerance = self.ctx.config.duration_tolerance;
        let path = self.ctx.layout.processed_visual(segment.order);
        let engine = self.ctx.engine.as_ref();

        if let Some(duration) = self.ctx.cache.reuse_media(ArtifactKind::ProcessedVisual, &path, engine).await {
            let cached = ProcessedVisualAsset::new(segment.order, path.clone(), duration)?;
            if cached.drift_from(slot) <= tolerance {
                return Ok(cached);
            }
            warn!(
                segment = segment.order,
                cached_secs = duration,
                slot_secs = slot,
                "Cached processed visual no longer matches narration; reprocessing"
            );
        }

        let raw = self.raw_visual(segment).await?;
        let processed = engine.reconcile(&raw, slot, &path).await?;

        if processed.drift_from(slot) > tolerance {
            return Err(PipelineError::DurationInvariant {
                segment: segment.order,
                expected: slot,
                actual: processed.duration,
                tolerance,
            });
        }
        Ok(processed)
    }

    /// Transcribed words; a failed transcription falls back to a single cue.
    async fn words_for(&self, audio: &AudioAsset) -> Vec<WordToken> {
        let transcriber = &self.ctx.collaborators.transcriber;
        match self
            .ctx
            .calls
            .call("transcriber", || transcriber.transcribe(&audio.path))
            .await
        {
            Ok(words) => words,
            Err(e) => {
                warn!(segment = audio.segment, "Transcription failed, using full-text caption: {}", e);
                Vec::new()
            }
        }
    }
}

/// Keep segment-local failures as values; anything else stops the run.
fn abort_on_run_level<T>(results: Vec<PipelineResult<T>>) -> PipelineResult<Vec<PipelineResult<T>>> {
    let mut kept = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Err(e) if !e.is_segment_local() => return Err(e),
            other => kept.push(other),
        }
    }
    Ok(kept)
}
