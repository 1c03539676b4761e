//! Gemini client for report ranking and segmentation.
//!
//! Both calls ask for a single JSON object and try each configured model in
//! turn until one answers with parseable output.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use nclip_models::{Report, SegmentDraft};

use crate::collaborators::{RankingCandidate, RankingScore, ReportRanker, Segmenter};
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash-lite", "gemini-2.5-flash"];

/// Gemini API client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: Client,
    base_url: String,
    models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RankingEnvelope {
    #[serde(alias = "analyseret_data")]
    rankings: Vec<RankingScore>,
}

#[derive(Debug, Deserialize)]
struct SegmentEnvelope {
    #[serde(alias = "subarticles")]
    segments: Vec<SegmentDraft>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Point the client at another endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Models to try, in order.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        if !models.is_empty() {
            self.models = models;
        }
        self
    }

    /// Run `prompt` against each model until one returns valid JSON.
    async fn generate_json<T: DeserializeOwned>(&self, prompt: &str) -> PipelineResult<T> {
        let mut last_error = None;

        for model in &self.models {
            debug!(model = %model, "Calling Gemini");
            match self.call_model(model, prompt).await {
                Ok(text) => match serde_json::from_str::<T>(strip_json_fences(&text)) {
                    Ok(value) => {
                        info!(model = %model, "Gemini answered");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(model = %model, "Unparseable Gemini output: {}", e);
                        last_error = Some(PipelineError::upstream(
                            SERVICE,
                            format!("invalid JSON from {model}: {e}"),
                        ));
                    }
                },
                Err(e) => {
                    warn!(model = %model, "Gemini call failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::upstream(SERVICE, "no models configured")))
    }

    async fn call_model(&self, model: &str, prompt: &str) -> PipelineResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::upstream(
                SERVICE,
                format!("{model} returned {status}: {error_text}"),
            ));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream(SERVICE, format!("unreadable response: {}", e.without_url())))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::upstream(SERVICE, format!("{model} returned no text")))
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn ranking_prompt(candidates: &[RankingCandidate]) -> String {
    let mut listing = String::new();
    for c in candidates {
        listing.push_str(&format!("ID: {}\nTitle: {}\nSummary: {}\n\n", c.index, c.title, c.summary));
    }

    format!(
        r#"Below are today's Danish police incident reports.
Give each report a newsworthiness score from 1 to 10, where 10 is reserved for
killings, large robberies or highly unusual incidents.

Reports:
{listing}
Return ONLY a single JSON object of this shape, one entry per report, using the ID given above as "index":
{{
  "rankings": [
    {{"index": 0, "score": 8, "justification": "short reason in Danish"}}
  ]
}}
"#
    )
}

fn segment_prompt(report: &Report) -> String {
    format!(
        r#"You are a news editor preparing a short vertical news video.
Split this Danish police report into 3 to 6 consecutive narration segments.

TITLE: {title}
SUMMARY: {summary}
CONTENT: {body}

Rules:
1. Each segment is 15-30 words of DANISH narration for a voice-over.
2. Each segment covers one part of the story and they read as one narrative in order.
3. Each segment has an ENGLISH visual prompt describing a low poly 3D animated scene
   whose mood matches the text, e.g. "Low poly 3D render: police car with flashing
   lights in geometric city streets at night, tense atmosphere".

Return ONLY a single JSON object:
{{
  "segments": [
    {{"text": "Danish narration", "visual_prompt": "Low poly 3D render: ..."}}
  ]
}}
"#,
        title = report.title,
        summary = report.summary,
        body = report.body,
    )
}

#[async_trait]
impl ReportRanker for GeminiClient {
    async fn rank(&self, candidates: &[RankingCandidate]) -> PipelineResult<Vec<RankingScore>> {
        let envelope: RankingEnvelope = self.generate_json(&ranking_prompt(candidates)).await?;
        Ok(envelope.rankings)
    }
}

#[async_trait]
impl Segmenter for GeminiClient {
    async fn segment(&self, report: &Report) -> PipelineResult<Vec<SegmentDraft>> {
        let envelope: SegmentEnvelope = self.generate_json(&segment_prompt(report)).await?;
        Ok(envelope.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nclip_models::ScrapedReport;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn answer(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn report() -> Report {
        let scraped = ScrapedReport::new(
            "Røveri i Aalborg",
            "Butik røvet",
            "To maskerede mænd røvede en kiosk.",
            "https://politi.dk/nordjyllands-politi/1",
        )
        .unwrap();
        Report::scored(scraped, 8, "Væbnet røveri").unwrap()
    }

    #[test]
    fn test_strip_json_fences() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_json_fences("  {}  "), "{}");
    }

    #[test]
    fn test_ranking_prompt_lists_ids() {
        let prompt = ranking_prompt(&[RankingCandidate {
            index: 4,
            title: "Brand".into(),
            summary: "Stor brand".into(),
        }]);
        assert!(prompt.contains("ID: 4\nTitle: Brand"));
    }

    #[tokio::test]
    async fn test_rank_parses_fenced_danish_payload() {
        let server = MockServer::start().await;
        let payload = "```json\n{\"analyseret_data\": [{\"index\": 0, \"nyhedsscore\": 7, \"begrundelse\": \"Røveri\"}]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer(payload)))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let candidates = vec![RankingCandidate {
            index: 0,
            title: "Røveri".into(),
            summary: "".into(),
        }];
        let scores = client.rank(&candidates).await.unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 7);
        assert_eq!(scores[0].justification, "Røveri");
    }

    #[tokio::test]
    async fn test_segment_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let payload = json!({"subarticles": [
            {"text": "To mænd røvede en kiosk.", "video_prompt": "Low poly 3D render: kiosk at night"},
            {"text": "De flygtede i bil.", "video_prompt": "Low poly 3D render: car chase"},
            {"text": "Politiet efterlyser vidner.", "video_prompt": "Low poly 3D render: police station"}
        ]})
        .to_string();
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer(&payload)))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let drafts = client.segment(&report()).await.unwrap();

        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[2].visual_prompt, "Low poly 3D render: police station");
    }

    #[tokio::test]
    async fn test_all_models_failing_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("not json at all")))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key").with_base_url(server.uri());
        let err = client.segment(&report()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamService { .. }));
        assert!(err.is_retryable());
    }
}
