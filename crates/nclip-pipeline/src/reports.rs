//! Scraped report input.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use nclip_models::ScrapedReport;

use crate::collaborators::ReportSource;
use crate::error::{PipelineError, PipelineResult};

/// Reads scraped reports from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonReportSource {
    path: PathBuf,
}

impl JsonReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSource for JsonReportSource {
    async fn fetch(&self) -> PipelineResult<Vec<ScrapedReport>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let records: Vec<ScrapedReport> = serde_json::from_slice(&bytes)?;
        let total = records.len();

        // Incomplete records are skipped rather than failing the batch.
        let valid: Vec<ScrapedReport> = records
            .into_iter()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(title = %r.title, "Skipping report: {}", e);
                    false
                }
            })
            .collect();

        if valid.is_empty() {
            return Err(PipelineError::upstream(
                "reports",
                format!("no usable reports in {}", self.path.display()),
            ));
        }
        info!(path = %self.path.display(), total, usable = valid.len(), "Loaded reports");
        Ok(valid)
    }
}
