//! Cache/reuse manager.
//!
//! Existence of a file at its expected path is the only reuse signal.
//! Metadata JSON (ranked reports, segment list) is trusted as stored, except
//! that a segment list cut from a different report is a miss. Media
//! artifacts are re-probed so their durations always come from the file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use nclip_media::MediaEngine;
use nclip_models::{Report, Segment, VisualKind};

use crate::error::{PipelineError, PipelineResult};

const VIDEOS_DIR: &str = "videos";
const CLIPS_DIR: &str = "clips";
const AUDIO_DIR: &str = "audio";
const FINAL_DIR: &str = "final";

/// Segment list as persisted, keyed by the report it was cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSegments {
    pub report_url: String,
    pub segments: Vec<Segment>,
}

/// Artifacts the pipeline may reuse across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ReportSelection,
    Segments,
    Audio,
    RawVisual,
    ProcessedVisual,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::ReportSelection => "report_selection",
            ArtifactKind::Segments => "segments",
            ArtifactKind::Audio => "audio",
            ArtifactKind::RawVisual => "raw_visual",
            ArtifactKind::ProcessedVisual => "processed_visual",
        }
    }
}

/// Where each artifact lives under the output directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_cache(&self) -> PathBuf {
        self.root.join("report_cache.json")
    }

    pub fn segments_cache(&self) -> PathBuf {
        self.root.join("subarticles_cache.json")
    }

    pub fn audio(&self, segment: usize) -> PathBuf {
        self.root.join(AUDIO_DIR).join(format!("subarticle_{segment}.mp3"))
    }

    /// Single narration track for the whole script.
    pub fn narration(&self) -> PathBuf {
        self.root.join(AUDIO_DIR).join("narration.mp3")
    }

    pub fn raw_visual(&self, segment: usize, kind: VisualKind) -> PathBuf {
        self.root
            .join(VIDEOS_DIR)
            .join(format!("clip_{segment}.{}", kind.extension()))
    }

    pub fn processed_visual(&self, segment: usize) -> PathBuf {
        self.root.join(CLIPS_DIR).join(format!("processed_{segment}.mp4"))
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join(FINAL_DIR)
    }

    pub fn manifest(&self) -> PathBuf {
        self.final_dir().join("run_manifest.json")
    }

    /// Make the directory tree ready for a run.
    ///
    /// Without reuse the previous run's output is removed first.
    pub async fn prepare(&self, reuse_existing: bool) -> PipelineResult<()> {
        if !reuse_existing && fs::try_exists(&self.root).await? {
            info!(dir = %self.root.display(), "Clearing previous output");
            fs::remove_dir_all(&self.root).await?;
        }
        for dir in [VIDEOS_DIR, CLIPS_DIR, AUDIO_DIR, FINAL_DIR] {
            fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }
}

/// Reuse-or-regenerate decision for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Regenerate,
}

/// Decides per artifact whether a previous run's output is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    pub reuse_existing: bool,
}

impl CachePolicy {
    pub fn new(reuse_existing: bool) -> Self {
        Self { reuse_existing }
    }

    pub async fn decide(&self, kind: ArtifactKind, path: &Path) -> CacheDecision {
        let exists = self.reuse_existing && fs::try_exists(path).await.unwrap_or(false);
        let decision = if exists {
            CacheDecision::Reuse
        } else {
            CacheDecision::Regenerate
        };

        if self.reuse_existing {
            let name = match decision {
                CacheDecision::Reuse => "nclip_cache_hits_total",
                CacheDecision::Regenerate => "nclip_cache_misses_total",
            };
            metrics::counter!(name, "artifact" => kind.as_str()).increment(1);
        }
        debug!(artifact = kind.as_str(), path = %path.display(), ?decision, "Cache decision");
        decision
    }

    /// Load cached JSON metadata, or `None` when it must be regenerated.
    ///
    /// A cached file that cannot be parsed is treated as a miss.
    pub async fn load_json<T: DeserializeOwned>(&self, kind: ArtifactKind, path: &Path) -> Option<T> {
        if self.decide(kind, path).await == CacheDecision::Regenerate {
            return None;
        }
        let loaded = async {
            let bytes = fs::read(path).await?;
            Ok::<T, PipelineError>(serde_json::from_slice(&bytes)?)
        }
        .await;

        match loaded {
            Ok(value) => {
                info!(artifact = kind.as_str(), path = %path.display(), "Reusing cached metadata");
                Some(value)
            }
            Err(e) => {
                report_inconsistency(kind, path, e.to_string());
                None
            }
        }
    }

    /// Cached segments cut from `report`, or `None` when they must be
    /// regenerated.
    pub async fn load_segments(&self, path: &Path, report: &Report) -> Option<Vec<Segment>> {
        let cached: CachedSegments = self.load_json(ArtifactKind::Segments, path).await?;
        if cached.report_url != report.url {
            report_inconsistency(
                ArtifactKind::Segments,
                path,
                format!("segments were cut from {}, not {}", cached.report_url, report.url),
            );
            return None;
        }
        if cached.segments.is_empty() {
            return None;
        }
        Some(cached.segments)
    }

    /// Probe a cached media file and return its duration, or `None` when it
    /// must be regenerated.
    pub async fn reuse_media(
        &self,
        kind: ArtifactKind,
        path: &Path,
        engine: &dyn MediaEngine,
    ) -> Option<f64> {
        if self.decide(kind, path).await == CacheDecision::Regenerate {
            return None;
        }
        match engine.probe_duration(path).await {
            Ok(duration) => {
                debug!(artifact = kind.as_str(), path = %path.display(), duration_secs = duration, "Reusing cached media");
                Some(duration)
            }
            Err(e) => {
                report_inconsistency(kind, path, e.to_string());
                None
            }
        }
    }

    /// Existence-only reuse, for artifacts without a playable duration.
    pub async fn reuse_file(&self, kind: ArtifactKind, path: &Path) -> bool {
        self.decide(kind, path).await == CacheDecision::Reuse
    }
}

fn report_inconsistency(kind: ArtifactKind, path: &Path, reason: String) {
    let err = PipelineError::CacheInconsistency {
        path: path.to_path_buf(),
        reason,
    };
    warn!(artifact = kind.as_str(), "{}; regenerating", err);
    metrics::counter!("nclip_cache_inconsistencies_total", "artifact" => kind.as_str()).increment(1);
}

/// Write JSON through a temporary file so readers never see half a document.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nclip_media::{CompositionPlan, MediaError, MediaResult};
    use nclip_models::{ProcessedVisualAsset, RawVisualAsset, ScrapedReport};
    use tempfile::TempDir;

    struct ProbeOnly(MediaResult<f64>);

    #[async_trait]
    impl MediaEngine for ProbeOnly {
        async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
            match &self.0 {
                Ok(d) => Ok(*d),
                Err(_) => Err(MediaError::InvalidMedia("truncated".into())),
            }
        }

        async fn reconcile(
            &self,
            _raw: &RawVisualAsset,
            _target: f64,
            _output: &Path,
        ) -> MediaResult<ProcessedVisualAsset> {
            unreachable!()
        }

        async fn render(&self, _plan: &CompositionPlan, _output: &Path) -> MediaResult<PathBuf> {
            unreachable!()
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = CacheLayout::new("output");
        assert_eq!(layout.audio(2), PathBuf::from("output/audio/subarticle_2.mp3"));
        assert_eq!(
            layout.raw_visual(0, VisualKind::Image),
            PathBuf::from("output/videos/clip_0.png")
        );
        assert_eq!(layout.processed_visual(3), PathBuf::from("output/clips/processed_3.mp4"));
        assert_eq!(layout.manifest(), PathBuf::from("output/final/run_manifest.json"));
    }

    #[tokio::test]
    async fn test_prepare_clears_without_reuse() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path().join("out"));
        layout.prepare(false).await.unwrap();
        fs::write(layout.audio(0), b"old").await.unwrap();

        layout.prepare(true).await.unwrap();
        assert!(layout.audio(0).exists());

        layout.prepare(false).await.unwrap();
        assert!(!layout.audio(0).exists());
        assert!(layout.final_dir().is_dir());
        assert!(layout.root().join("videos").is_dir());
    }

    #[tokio::test]
    async fn test_reuse_disabled_always_regenerates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report_cache.json");
        fs::write(&path, b"[]").await.unwrap();

        let policy = CachePolicy::new(false);
        assert_eq!(policy.decide(ArtifactKind::ReportSelection, &path).await, CacheDecision::Regenerate);
    }

    fn report(title: &str, url: &str) -> Report {
        let scraped = ScrapedReport::new(title, "", "Politiet oplyser", url).unwrap();
        Report::scored(scraped, 7, "").unwrap()
    }

    #[tokio::test]
    async fn test_segments_roundtrip_through_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subarticles_cache.json");
        let report = report("Brand i Aarhus", "https://politi.dk/1");
        let cached = CachedSegments {
            report_url: report.url.clone(),
            segments: vec![Segment::new(0, "Tekst", "prompt").unwrap()],
        };
        save_json(&path, &cached).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let policy = CachePolicy::new(true);
        let loaded = policy.load_segments(&path, &report).await;
        assert_eq!(loaded, Some(cached.segments));
    }

    #[tokio::test]
    async fn test_segments_from_another_report_are_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subarticles_cache.json");
        let cached = CachedSegments {
            report_url: "https://politi.dk/1".to_string(),
            segments: vec![Segment::new(0, "Tekst", "prompt").unwrap()],
        };
        save_json(&path, &cached).await.unwrap();

        let policy = CachePolicy::new(true);
        let other = report("Røveri på Vestergade", "https://politi.dk/2");
        assert!(policy.load_segments(&path, &other).await.is_none());
    }

    #[tokio::test]
    async fn test_bare_segment_list_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subarticles_cache.json");
        save_json(&path, &vec![Segment::new(0, "Tekst", "prompt").unwrap()]).await.unwrap();

        let policy = CachePolicy::new(true);
        let report = report("Brand i Aarhus", "https://politi.dk/1");
        assert!(policy.load_segments(&path, &report).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_json_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subarticles_cache.json");
        fs::write(&path, b"{not json").await.unwrap();

        let policy = CachePolicy::new(true);
        let loaded: Option<Vec<Segment>> = policy.load_json(ArtifactKind::Segments, &path).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_reuse_media_probes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subarticle_0.mp3");
        let policy = CachePolicy::new(true);

        let missing = policy.reuse_media(ArtifactKind::Audio, &path, &ProbeOnly(Ok(4.2))).await;
        assert!(missing.is_none());

        fs::write(&path, b"mp3").await.unwrap();
        let hit = policy.reuse_media(ArtifactKind::Audio, &path, &ProbeOnly(Ok(4.2))).await;
        assert_eq!(hit, Some(4.2));

        let broken = policy
            .reuse_media(ArtifactKind::Audio, &path, &ProbeOnly(Err(MediaError::Cancelled)))
            .await;
        assert!(broken.is_none());
    }
}
