//! Replicate client for image and video generation.
//!
//! Predictions are created with `Prefer: wait` and polled until they reach a
//! terminal state; the first output URL is then downloaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::fs;
use tracing::{debug, info};

use nclip_models::{Segment, VisualKind};

use crate::collaborators::VisualGenerator;
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "replicate";
const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Appended to every video prompt.
const VIDEO_STYLE_SUFFIX: &str = "flat shaded, geometric triangular shapes, clean edges, stylized 3D, pastel colors, soft ambient lighting, Blender low poly style";

const SDXL_VERSION: &str = "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";

/// Names accepted by [`ModelSpec::video`].
pub const VIDEO_MODELS: &[&str] = &["pixverse", "minimax", "luma", "ltx-video", "hunyuan"];

/// A generation model and the fixed inputs it is called with.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub key: &'static str,
    /// `owner/name`
    pub model: &'static str,
    /// Pinned version; official models run without one
    pub version: Option<&'static str>,
    pub kind: VisualKind,
    pub params: Map<String, Value>,
    pub negative_prompt: Option<&'static str>,
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ModelSpec {
    /// Look up a video model by name.
    pub fn video(key: &str) -> PipelineResult<Self> {
        let (key, model, extra, negative_prompt) = match key {
            "pixverse" => (
                "pixverse",
                "pixverse/pixverse-v4.5",
                json!({"aspect_ratio": "9:16", "duration": 5, "quality": "720p", "style": "3d_animation"}),
                Some("realistic, photograph, photo, high detail, complex textures, noise, grain, text, watermark, blurry, ugly, deformed"),
            ),
            "minimax" => ("minimax", "minimax/video-01", json!({"prompt_optimizer": true}), None),
            "luma" => ("luma", "luma/ray", json!({"aspect_ratio": "9:16", "loop": false}), None),
            "ltx-video" => (
                "ltx-video",
                "lightricks/ltx-video",
                json!({"aspect_ratio": "9:16", "num_frames": 97}),
                Some("worst quality, inconsistent motion, blurry, jittery, distorted"),
            ),
            "hunyuan" => (
                "hunyuan",
                "tencent/hunyuan-video",
                json!({"width": 544, "height": 960, "video_length": 129}),
                None,
            ),
            other => {
                return Err(PipelineError::config(format!(
                    "unknown video model '{other}', available: {}",
                    VIDEO_MODELS.join(", ")
                )))
            }
        };

        Ok(Self {
            key,
            model,
            version: None,
            kind: VisualKind::Video,
            params: params(extra),
            negative_prompt,
        })
    }

    /// Vertical still image model.
    pub fn image() -> Self {
        Self {
            key: "sdxl",
            model: "stability-ai/sdxl",
            version: Some(SDXL_VERSION),
            kind: VisualKind::Image,
            params: params(json!({"width": 1080, "height": 1920, "refine": "expert_ensemble_refiner"})),
            negative_prompt: Some(
                "realistic, photograph, photo, text, watermark, blurry, high detail, complex textures, noise, grain",
            ),
        }
    }

    /// Wrap a scene description in the model's house style.
    pub fn styled_prompt(&self, prompt: &str) -> String {
        match self.kind {
            VisualKind::Video => format!("{prompt}, {VIDEO_STYLE_SUFFIX}"),
            VisualKind::Image => format!(
                "Low poly 3D render, stylized geometric shapes, {prompt}, isometric view, soft pastel lighting, minimal details, clean aesthetic, blender style, polygon art, vertical composition, 4k"
            ),
        }
    }

    /// Full `input` object for a prediction.
    pub fn input(&self, prompt: &str) -> Value {
        let mut input = self.params.clone();
        input.insert("prompt".to_string(), Value::String(self.styled_prompt(prompt)));
        if let Some(negative) = self.negative_prompt {
            input.insert("negative_prompt".to_string(), Value::String(negative.to_string()));
        }
        Value::Object(input)
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; models return either a string or a list.
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Replicate API client bound to one model.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    token: String,
    client: Client,
    base_url: String,
    spec: ModelSpec,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateClient {
    pub fn new(token: impl Into<String>, spec: ModelSpec) -> Self {
        Self {
            token: token.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            spec,
            poll_interval: Duration::from_secs(2),
            max_polls: 300,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn create_prediction(&self, prompt: &str) -> PipelineResult<Prediction> {
        let input = self.spec.input(prompt);
        let (url, body) = match self.spec.version {
            Some(version) => (
                format!("{}/v1/predictions", self.base_url),
                json!({"version": version, "input": input}),
            ),
            None => (
                format!("{}/v1/models/{}/predictions", self.base_url, self.spec.model),
                json!({"input": input}),
            ),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("request failed: {e}")))?;
        read_prediction(response).await
    }

    async fn get_prediction(&self, prediction: &Prediction) -> PipelineResult<Prediction> {
        let url = prediction
            .urls
            .as_ref()
            .and_then(|u| u.get.clone())
            .unwrap_or_else(|| format!("{}/v1/predictions/{}", self.base_url, prediction.id));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("poll failed: {e}")))?;
        read_prediction(response).await
    }

    /// Run a prediction to completion and return its output URL.
    async fn run(&self, prompt: &str) -> PipelineResult<String> {
        let mut prediction = self.create_prediction(prompt).await?;
        let mut polls = 0;

        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(PipelineError::upstream(
                    SERVICE,
                    format!("prediction {} still {} after {} polls", prediction.id, prediction.status, polls),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.get_prediction(&prediction).await?;
            polls += 1;
            debug!(prediction = %prediction.id, status = %prediction.status, "Polled prediction");
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(PipelineError::upstream(
                SERVICE,
                format!("prediction {} {}: {}", prediction.id, prediction.status, reason),
            ));
        }

        prediction
            .output_url()
            .ok_or_else(|| PipelineError::upstream(SERVICE, format!("prediction {} has no output", prediction.id)))
    }

    async fn download(&self, url: &str, output: &Path) -> PipelineResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::upstream(
                SERVICE,
                format!("download returned {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("download failed: {e}")))?;
        if bytes.is_empty() {
            return Err(PipelineError::upstream(SERVICE, "downloaded asset is empty"));
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(output, &bytes).await?;
        Ok(())
    }
}

async fn read_prediction(response: reqwest::Response) -> PipelineResult<Prediction> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(PipelineError::upstream(SERVICE, format!("returned {status}: {error_text}")));
    }
    response
        .json()
        .await
        .map_err(|e| PipelineError::upstream(SERVICE, format!("unreadable prediction: {e}")))
}

#[async_trait]
impl VisualGenerator for ReplicateClient {
    fn kind(&self) -> VisualKind {
        self.spec.kind
    }

    async fn generate(&self, segment: &Segment, output: &Path) -> PipelineResult<PathBuf> {
        info!(segment = segment.order, model = self.spec.key, "Generating visual");
        let url = self.run(&segment.visual_prompt).await?;
        self.download(&url, output).await?;
        info!(segment = segment.order, path = %output.display(), "Visual downloaded");
        Ok(output.to_path_buf())
    }
}
