//! Word-level transcription through the `whisper` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use nclip_models::WordToken;

use crate::collaborators::Transcriber;
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "whisper";

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    words: Vec<WhisperWord>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    #[serde(default)]
    word: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

/// Flatten whisper's JSON into trimmed word tokens.
pub fn parse_words(json: &str) -> PipelineResult<Vec<WordToken>> {
    let output: WhisperOutput = serde_json::from_str(json)
        .map_err(|e| PipelineError::upstream(SERVICE, format!("invalid transcript JSON: {e}")))?;

    Ok(output
        .segments
        .into_iter()
        .flat_map(|s| s.words)
        .map(|w| WordToken::new(w.word.trim(), w.start, w.end))
        .filter(|w| !w.text.is_empty())
        .collect())
}

/// Runs OpenAI's `whisper` command with word timestamps.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary: PathBuf,
    model: String,
    language: String,
}

impl WhisperCli {
    pub fn new(model: impl Into<String>, language: impl Into<String>) -> PipelineResult<Self> {
        let binary = which::which("whisper")
            .map_err(|_| PipelineError::config("whisper not found in PATH"))?;
        Ok(Self {
            binary,
            model: model.into(),
            language: language.into(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Vec<WordToken>> {
        let workdir = tempfile::tempdir()?;
        debug!(audio = %audio.display(), model = %self.model, "Running whisper");

        let output = Command::new(&self.binary)
            .arg(audio)
            .args(["--model", self.model.as_str()])
            .args(["--language", self.language.as_str()])
            .args(["--word_timestamps", "True"])
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .arg(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(PipelineError::upstream(
                SERVICE,
                format!("exited with {}: {}", output.status, tail.into_iter().rev().collect::<Vec<_>>().join(" | ")),
            ));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let json = tokio::fs::read_to_string(workdir.path().join(format!("{stem}.json"))).await?;
        let words = parse_words(&json)?;

        info!(audio = %audio.display(), words = words.len(), "Transcribed narration");
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words_flattens_segments() {
        let json = r#"{
            "text": " Politiet rykkede ud. Ingen kom til skade.",
            "segments": [
                {"id": 0, "words": [
                    {"word": " Politiet", "start": 0.0, "end": 0.42, "probability": 0.9},
                    {"word": " rykkede", "start": 0.42, "end": 0.8},
                    {"word": " ud.", "start": 0.8, "end": 1.1}
                ]},
                {"id": 1, "words": [
                    {"word": " Ingen", "start": 1.4, "end": 1.7},
                    {"word": " ", "start": 1.7, "end": 1.7}
                ]}
            ]
        }"#;

        let words = parse_words(json).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].text, "Politiet");
        assert_eq!(words[2].text, "ud.");
        assert!((words[3].start - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_words_without_segments() {
        assert!(parse_words(r#"{"text": ""}"#).unwrap().is_empty());
        assert!(parse_words("garbage").is_err());
    }
}
