//! Validation errors raised by model constructors.

use thiserror::Error;

/// Result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Invariant violations detected while building a model value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} must be a positive duration, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("Newsworthiness score must be within 1..=10, got {0}")]
    ScoreOutOfRange(i64),

    #[error("Invalid report URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid interval: start {start} must be before end {end}")]
    InvalidInterval { start: f64, end: f64 },

    #[error("Expected between {min} and {max} segments, got {count}")]
    SegmentCount { count: usize, min: usize, max: usize },
}

impl ModelError {
    pub(crate) fn empty(field: &'static str) -> Self {
        Self::EmptyField { field }
    }
}

/// Reject empty or whitespace-only text, returning the trimmed value.
pub(crate) fn require_text(field: &'static str, value: impl Into<String>) -> ModelResult<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModelError::empty(field));
    }
    Ok(trimmed.to_string())
}

/// Reject zero, negative, NaN and infinite durations.
pub(crate) fn require_positive(field: &'static str, value: f64) -> ModelResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ModelError::InvalidDuration { field, value })
    }
}
