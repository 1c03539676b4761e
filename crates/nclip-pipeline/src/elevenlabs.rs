//! ElevenLabs text-to-speech client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::collaborators::SpeechSynthesizer;
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "elevenlabs";
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
/// Calm news-anchor voice.
const DEFAULT_VOICE_ID: &str = "onwK4e9ZLuTAKqWW03F9";
const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Debug, Clone, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.80,
            similarity_boost: 0.70,
            style: 0.15,
            use_speaker_boost: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// ElevenLabs API client.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    client: Client,
    base_url: String,
    voice_id: String,
    model_id: String,
    settings: VoiceSettings,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            settings: VoiceSettings::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<PathBuf> {
        if text.trim().is_empty() {
            return Err(PipelineError::upstream(SERVICE, "refusing to synthesize empty text"));
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let request = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: &self.settings,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::upstream(
                SERVICE,
                format!("returned {status}: {error_text}"),
            ));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("failed to read audio: {e}")))?;
        if audio.is_empty() {
            return Err(PipelineError::upstream(SERVICE, "returned empty audio"));
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(output, &audio).await?;

        info!(path = %output.display(), bytes = audio.len(), "Speech synthesized");
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_synthesize_writes_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/onwK4e9ZLuTAKqWW03F9"))
            .and(header("xi-api-key", "key"))
            .and(body_partial_json(json!({
                "model_id": "eleven_multilingual_v2",
                "voice_settings": {"use_speaker_boost": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fakeaudio".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("audio").join("subarticle_0.mp3");
        let client = ElevenLabsClient::new("key").with_base_url(server.uri());
        let written = client.synthesize("Politiet efterlyser vidner.", &out).await.unwrap();

        assert_eq!(written, out);
        assert_eq!(std::fs::read(&out).unwrap(), b"ID3fakeaudio");
    }

    #[tokio::test]
    async fn test_synthesize_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("a.mp3");
        let client = ElevenLabsClient::new("bad").with_base_url(server.uri());
        let err = client.synthesize("Hej", &out).await.unwrap_err();

        assert!(err.to_string().contains("401"));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let client = ElevenLabsClient::new("key");
        assert!(client.synthesize("  ", Path::new("x.mp3")).await.is_err());
    }
}
