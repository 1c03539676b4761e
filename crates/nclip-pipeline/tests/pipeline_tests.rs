//! End-to-end runs with in-memory collaborators and a fake media engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use nclip_media::{AudioLayout, CompositionPlan, MediaEngine, MediaError, MediaResult, VisualSource};
use nclip_models::{
    ProcessedVisualAsset, RawVisualAsset, Report, ScrapedReport, Segment, SegmentDraft, VisualKind,
    WordToken,
};
use nclip_pipeline::{
    CachedSegments, Collaborators, NarrationMode, Pipeline, PipelineConfig, PipelineContext, PipelineError,
    PipelineResult, RankingCandidate, RankingScore, ReportRanker, ReportSource, Segmenter,
    SpeechSynthesizer, Transcriber, VisualGenerator,
};

const TEXTS: [(&str, f64); 3] = [
    ("Politiet rykkede ud til Vestergade.", 4.0),
    ("En mand blev anholdt.", 6.5),
    ("Han sigtes for røveri.", 3.2),
];
const SCRIPT_SECS: f64 = 12.0;

/// Media files hold their duration as text.
#[derive(Default)]
struct FakeEngine {
    rendered: Mutex<Vec<CompositionPlan>>,
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
        text.trim()
            .parse()
            .map_err(|_| MediaError::InvalidMedia(format!("unreadable duration in {}", path.display())))
    }

    async fn reconcile(
        &self,
        raw: &RawVisualAsset,
        target: f64,
        output: &Path,
    ) -> MediaResult<ProcessedVisualAsset> {
        tokio::fs::write(output, target.to_string()).await?;
        ProcessedVisualAsset::new(raw.segment, output, target).map_err(|e| MediaError::InvalidMedia(e.to_string()))
    }

    async fn render(&self, plan: &CompositionPlan, output: &Path) -> MediaResult<PathBuf> {
        plan.validate(0.05)?;
        tokio::fs::write(output, plan.total_duration().to_string()).await?;
        self.rendered.lock().unwrap().push(plan.clone());
        Ok(output.to_path_buf())
    }
}

struct FakeReports;

#[async_trait]
impl ReportSource for FakeReports {
    async fn fetch(&self) -> PipelineResult<Vec<ScrapedReport>> {
        Ok(vec![
            ScrapedReport::new("Cykeltyveri i Viborg", "", "En cykel blev stjålet.", "https://politi.dk/1")?,
            ScrapedReport::new("Røveri på Vestergade!", "Mand anholdt", "Butik røvet.", "https://politi.dk/2")?,
        ])
    }
}

#[derive(Default)]
struct FakeRanker {
    calls: AtomicUsize,
}

#[async_trait]
impl ReportRanker for FakeRanker {
    async fn rank(&self, candidates: &[RankingCandidate]) -> PipelineResult<Vec<RankingScore>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(candidates
            .iter()
            .map(|c| RankingScore {
                index: c.index as i64,
                score: if c.title.starts_with("Røveri") { 9 } else { 2 },
                justification: "test".into(),
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeSegmenter {
    calls: AtomicUsize,
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(&self, report: &Report) -> PipelineResult<Vec<SegmentDraft>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(report.title, "Røveri på Vestergade!");
        Ok(TEXTS
            .iter()
            .map(|(text, _)| SegmentDraft {
                text: text.to_string(),
                visual_prompt: "Low poly 3D render: police car".into(),
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeSpeech {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let duration = TEXTS
            .iter()
            .find(|(t, _)| *t == text)
            .map(|(_, d)| *d)
            .unwrap_or(SCRIPT_SECS);
        tokio::fs::write(output, duration.to_string()).await?;
        Ok(output.to_path_buf())
    }
}

struct FakeVisuals {
    failing: HashSet<usize>,
    calls: AtomicUsize,
}

impl FakeVisuals {
    fn failing(segments: &[usize]) -> Self {
        Self {
            failing: segments.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisualGenerator for FakeVisuals {
    fn kind(&self) -> VisualKind {
        VisualKind::Video
    }

    async fn generate(&self, segment: &Segment, output: &Path) -> PipelineResult<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&segment.order) {
            return Err(PipelineError::upstream("replicate", "prediction failed"));
        }
        tokio::fs::write(output, "5.0").await?;
        Ok(output.to_path_buf())
    }
}

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &Path) -> PipelineResult<Vec<WordToken>> {
        Ok(vec![
            WordToken::new("politiet", 0.0, 0.4),
            WordToken::new("rykkede", 0.5, 0.9),
            WordToken::new("ud.", 1.0, 1.2),
        ])
    }
}

struct Harness {
    _dir: TempDir,
    config: PipelineConfig,
    engine: Arc<FakeEngine>,
    ranker: Arc<FakeRanker>,
    segmenter: Arc<FakeSegmenter>,
    speech: Arc<FakeSpeech>,
    visuals: Arc<FakeVisuals>,
}

impl Harness {
    fn new(failing: &[usize]) -> Self {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().join("output"),
            call_retries: 0,
            retry_base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        };
        Self {
            _dir: dir,
            config,
            engine: Arc::new(FakeEngine::default()),
            ranker: Arc::new(FakeRanker::default()),
            segmenter: Arc::new(FakeSegmenter::default()),
            speech: Arc::new(FakeSpeech::default()),
            visuals: Arc::new(FakeVisuals::failing(failing)),
        }
    }

    fn pipeline(&self) -> Pipeline {
        let collaborators = Collaborators {
            reports: Arc::new(FakeReports),
            ranker: self.ranker.clone(),
            segmenter: self.segmenter.clone(),
            speech: self.speech.clone(),
            visuals: self.visuals.clone(),
            transcriber: Arc::new(FakeTranscriber),
        };
        let ctx = PipelineContext::new(self.config.clone(), collaborators, self.engine.clone()).unwrap();
        Pipeline::new(ctx)
    }
}

#[tokio::test]
async fn test_full_run_places_all_segments() {
    let harness = Harness::new(&[]);
    let manifest = assert_ok!(harness.pipeline().run().await);

    assert_eq!(manifest.included_segments(), vec![0, 1, 2]);
    assert!((manifest.placements[1].start - 4.1).abs() < 1e-9);
    assert!((manifest.total_duration - 13.9).abs() < 1e-9);
    assert!(manifest.skipped.is_empty());
    assert!(manifest.output.ends_with("final/tiktok_subarticle_0_Røveri på Vestergade.mp4"));
    assert!(manifest.output.exists());
    assert!(harness.config.output_dir.join("final/run_manifest.json").exists());

    let rendered = harness.engine.rendered.lock().unwrap();
    assert_eq!(rendered[0].captions[0].text, "Politiet rykkede ud til");
    assert_eq!(rendered[0].captions[1].text, "Vestergade.");
}

#[tokio::test]
async fn test_failed_visual_skips_only_that_segment() {
    let harness = Harness::new(&[1]);
    let manifest = harness.pipeline().run().await.unwrap();

    assert_eq!(manifest.included_segments(), vec![0, 2]);
    assert_eq!(manifest.skipped.len(), 1);
    assert_eq!(manifest.skipped[0].segment, 1);
    assert!(manifest.skipped[0].reason.contains("prediction failed"));

    // Survivors are re-scheduled with the same gap.
    assert!((manifest.placements[1].start - 4.1).abs() < 1e-9);
    assert!((manifest.placements[1].end - 7.3).abs() < 1e-9);
    assert!(manifest.output.exists());
}

#[tokio::test]
async fn test_all_visuals_failing_is_composition_error() {
    let harness = Harness::new(&[0, 1, 2]);
    let err = assert_err!(harness.pipeline().run().await);

    assert!(matches!(err, PipelineError::Composition(_)));
    let final_dir = harness.config.output_dir.join("final");
    let leftovers: Vec<_> = std::fs::read_dir(&final_dir).unwrap().collect();
    assert!(leftovers.is_empty());
    assert!(harness.engine.rendered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reuse_skips_regeneration() {
    let mut harness = Harness::new(&[1]);
    harness.pipeline().run().await.unwrap();
    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.visuals.calls.load(Ordering::SeqCst), 3);

    harness.config.reuse_existing = true;
    let manifest = harness.pipeline().run().await.unwrap();

    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 3);
    // Only the segment without a cached visual is generated again.
    assert_eq!(harness.visuals.calls.load(Ordering::SeqCst), 4);
    assert_eq!(manifest.included_segments(), vec![0, 2]);
}

#[tokio::test]
async fn test_segments_cached_for_another_report_are_regenerated() {
    let mut harness = Harness::new(&[]);
    harness.pipeline().run().await.unwrap();
    assert_eq!(harness.segmenter.calls.load(Ordering::SeqCst), 1);

    let cache = harness.config.output_dir.join("subarticles_cache.json");
    let stale = CachedSegments {
        report_url: "https://politi.dk/1".into(),
        segments: (0..3)
            .map(|i| Segment::new(i, "En cykel blev stjålet.", "Low poly 3D render: bicycle").unwrap())
            .collect(),
    };
    std::fs::write(&cache, serde_json::to_vec(&stale).unwrap()).unwrap();

    harness.config.reuse_existing = true;
    let manifest = harness.pipeline().run().await.unwrap();

    assert_eq!(harness.ranker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.segmenter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(manifest.included_segments(), vec![0, 1, 2]);

    let stored: CachedSegments = serde_json::from_slice(&std::fs::read(&cache).unwrap()).unwrap();
    assert_eq!(stored.report_url, "https://politi.dk/2");
    assert_eq!(stored.segments[0].text, TEXTS[0].0);

    let rendered = harness.engine.rendered.lock().unwrap();
    assert_eq!(rendered[1].captions[0].text, "Politiet rykkede ud til");
}

#[tokio::test]
async fn test_single_track_fills_failed_visual() {
    let mut harness = Harness::new(&[1]);
    harness.config.narration = NarrationMode::SingleTrack;
    let manifest = harness.pipeline().run().await.unwrap();

    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 1);
    assert_eq!(manifest.included_segments(), vec![0, 1, 2]);
    assert!((manifest.total_duration - SCRIPT_SECS).abs() < 1e-9);
    assert!(manifest.skipped[0].reason.contains("filler"));

    let rendered = harness.engine.rendered.lock().unwrap();
    let plan = &rendered[0];
    assert!(matches!(plan.audio, AudioLayout::SingleTrack(_)));
    assert_eq!(plan.segments[1].visual, VisualSource::Filler);
    for pair in manifest.placements.windows(2) {
        assert!((pair[1].start - pair[0].end).abs() < 1e-9);
    }
}
