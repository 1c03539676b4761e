//! Police report records, before and after newsworthiness scoring.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{require_text, ModelError, ModelResult};

/// Lowest newsworthiness score the ranker may assign.
pub const MIN_SCORE: i64 = 1;
/// Highest newsworthiness score the ranker may assign.
pub const MAX_SCORE: i64 = 10;

/// A daily incident report as delivered by the scraper.
///
/// Accepts the scraper's Danish keys (`titel`, `manchet`, `indhold`) as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapedReport {
    #[serde(alias = "titel")]
    pub title: String,
    /// Short lead paragraph
    #[serde(default, alias = "manchet")]
    pub summary: String,
    #[serde(alias = "indhold")]
    pub body: String,
    pub url: String,
}

impl ScrapedReport {
    /// Build a scraped report, rejecting empty title/body and malformed URLs.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> ModelResult<Self> {
        let report = Self {
            title: title.into(),
            summary: summary.into(),
            body: body.into(),
            url: url.into(),
        };
        report.validate()?;
        Ok(report)
    }

    /// Check the invariants `new` enforces. Used for records loaded from JSON.
    pub fn validate(&self) -> ModelResult<()> {
        require_text("title", self.title.as_str())?;
        require_text("body", self.body.as_str())?;
        Url::parse(&self.url).map_err(|e| ModelError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// A report with its externally assigned newsworthiness.
///
/// Immutable once scored; one report per run is selected as the best.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub body: String,
    pub url: String,
    pub newsworthiness_score: u8,
    pub justification: String,
}

impl Report {
    /// Attach a ranking result to a scraped report.
    pub fn scored(
        source: ScrapedReport,
        score: i64,
        justification: impl Into<String>,
    ) -> ModelResult<Self> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(ModelError::ScoreOutOfRange(score));
        }
        Ok(Self {
            title: source.title,
            summary: source.summary,
            body: source.body,
            url: source.url,
            newsworthiness_score: score as u8,
            justification: justification.into().trim().to_string(),
        })
    }

    /// Text handed to the segmenter: title, lead and body.
    pub fn full_text(&self) -> String {
        let mut text = format!("TITLE: {}\n", self.title);
        if !self.summary.trim().is_empty() {
            text.push_str(&format!("SUMMARY: {}\n", self.summary.trim()));
        }
        text.push_str(&format!("CONTENT: {}", self.body.trim()));
        text
    }
}
