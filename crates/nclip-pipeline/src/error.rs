//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A collaborator was unavailable or returned malformed output.
    #[error("{service} failed: {message}")]
    UpstreamService { service: String, message: String },

    /// A processed visual does not cover its narration.
    #[error(
        "Segment {segment}: visual lasts {actual:.3}s but narration lasts {expected:.3}s (tolerance {tolerance:.3}s)"
    )]
    DurationInvariant {
        segment: usize,
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    /// A cached artifact could not be loaded despite a cache hit.
    #[error("Cached artifact {path} unusable: {reason}")]
    CacheInconsistency { path: PathBuf, reason: String },

    /// Nothing composable remains.
    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    #[error("Media error: {0}")]
    Media(#[from] nclip_media::MediaError),

    #[error("Invalid data: {0}")]
    Model(#[from] nclip_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    /// Check if another attempt at the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamService { .. } | PipelineError::Timeout { .. }
        )
    }

    /// Errors that cost one segment rather than the whole run.
    pub fn is_segment_local(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamService { .. }
                | PipelineError::Timeout { .. }
                | PipelineError::DurationInvariant { .. }
                | PipelineError::Media(_)
                | PipelineError::Model(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UpstreamService { .. } => "upstream",
            PipelineError::DurationInvariant { .. } => "duration_invariant",
            PipelineError::CacheInconsistency { .. } => "cache_inconsistency",
            PipelineError::Composition(_) => "composition",
            PipelineError::Config(_) => "config",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Media(_) => "media",
            PipelineError::Model(_) => "model",
            PipelineError::Io(_) => "io",
            PipelineError::Json(_) => "json",
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        let service = e
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        Self::upstream(service, e.to_string())
    }
}
