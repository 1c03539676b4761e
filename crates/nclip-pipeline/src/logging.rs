//! Structured run logging.
//!
//! Every line carries the run ID and the current stage so a run can be
//! followed through JSON logs.

use tracing::{error, info, warn, Span};

use nclip_models::RunId;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Workspace,
    Selection,
    Segmentation,
    Narration,
    Visuals,
    Reconciliation,
    Captions,
    Composition,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Workspace => "workspace",
            Stage::Selection => "selection",
            Stage::Segmentation => "segmentation",
            Stage::Narration => "narration",
            Stage::Visuals => "visuals",
            Stage::Reconciliation => "reconciliation",
            Stage::Captions => "captions",
            Stage::Composition => "composition",
        }
    }
}

/// Run logger for consistent lifecycle lines.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
}

impl RunLogger {
    pub fn new(run_id: &RunId) -> Self {
        Self {
            run_id: run_id.to_string(),
        }
    }

    pub fn stage_start(&self, stage: Stage, message: &str) {
        info!(run_id = %self.run_id, stage = stage.as_str(), "Stage started: {}", message);
    }

    pub fn stage_done(&self, stage: Stage, message: &str) {
        info!(run_id = %self.run_id, stage = stage.as_str(), "Stage finished: {}", message);
    }

    /// A segment was dropped from the run.
    pub fn segment_skipped(&self, stage: Stage, segment: usize, reason: &str) {
        warn!(
            run_id = %self.run_id,
            stage = stage.as_str(),
            segment,
            "Segment skipped: {}", reason
        );
    }

    pub fn failure(&self, message: &str) {
        error!(run_id = %self.run_id, "Run failed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span wrapping the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id)
    }
}
