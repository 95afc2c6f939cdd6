//! BatchFixer: operator-driven correction over a chosen window, plus the
//! on-demand RPC surface (`fix_application`, `fix_recent_applications`).
//!
//! Same scan body as the scheduler. Results are always structured; no
//! error escapes to the caller.

use crate::{
    corrector::{Correction, CorrectionReason, Corrector},
    error::ReconError,
    sweep::{hours_back_start, scan_ids, RecordOutcome, SweepSummary, Sweeper},
};
use serde::{Deserialize, Serialize};

/// Default look-back for `fix_recent_applications`.
pub const DEFAULT_HOURS_BACK: u32 = 2;

/// Response of `fix_application`. One per record in batch results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    pub app_id: String,
    pub success: bool,
    pub message: String,
    pub old_financing_type: Option<String>,
    pub new_financing_type: Option<String>,
    pub simulation_type: Option<String>,
    pub updated: bool,
    pub error: Option<String>,
}

impl FixResult {
    fn from_correction(c: &Correction) -> Self {
        let message = match c.reason {
            CorrectionReason::Corrected => "Financing type updated successfully",
            CorrectionReason::AlreadyCorrect | CorrectionReason::ConcurrentlyCorrected => {
                "Financing type already correct"
            }
            CorrectionReason::SourceNotReady => "Source plan not ready",
            CorrectionReason::NotApplicable => "Not a selected_plans application",
        };
        Self {
            app_id: c.application_id.clone(),
            success: true,
            message: message.into(),
            old_financing_type: c.old_financing_type.clone(),
            new_financing_type: c.new_financing_type.clone(),
            simulation_type: c.simulation_type.clone(),
            updated: c.updated,
            error: None,
        }
    }

    fn from_error(app_id: &str, err: &ReconError) -> Self {
        let error = match err {
            ReconError::ApplicationNotFound { .. } => "Application not found".to_string(),
            other => other.to_string(),
        };
        Self {
            app_id: app_id.to_string(),
            success: false,
            message: "Correction failed".into(),
            old_financing_type: None,
            new_financing_type: None,
            simulation_type: None,
            updated: false,
            error: Some(error),
        }
    }
}

impl From<RecordOutcome> for FixResult {
    fn from(outcome: RecordOutcome) -> Self {
        match (&outcome.correction, &outcome.error) {
            (Some(c), _) => FixResult::from_correction(c),
            (None, error) => Self {
                app_id: outcome.application_id,
                success: false,
                message: "Correction failed".into(),
                old_financing_type: None,
                new_financing_type: None,
                simulation_type: None,
                updated: false,
                error: error.clone(),
            },
        }
    }
}

/// Response of `fix_recent_applications` and explicit-id batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub success: bool,
    pub total_processed: usize,
    pub total_updated: usize,
    pub hours_back: Option<u32>,
    /// Counters only; per-record detail lives in `results`.
    pub summary: SweepSummary,
    pub results: Vec<FixResult>,
    pub error: Option<String>,
}

impl BatchReport {
    fn from_summary(mut summary: SweepSummary, hours_back: Option<u32>) -> Self {
        let results = std::mem::take(&mut summary.outcomes)
            .into_iter()
            .map(FixResult::from)
            .collect();
        Self {
            success: true,
            total_processed: summary.candidates,
            total_updated: summary.corrected,
            hours_back,
            summary,
            results,
            error: None,
        }
    }

    fn failed(hours_back: Option<u32>, error: String) -> Self {
        Self {
            success: false,
            total_processed: 0,
            total_updated: 0,
            hours_back,
            summary: SweepSummary::default(),
            results: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchScope {
    HoursBack(u32),
    Ids(Vec<String>),
}

pub struct BatchFixer {
    sweeper: Sweeper,
}

impl BatchFixer {
    pub fn new(corrector: Corrector) -> Self {
        // Window is supplied per call.
        Self {
            sweeper: Sweeper::new(corrector, chrono::TimeDelta::zero()),
        }
    }

    fn corrector(&self) -> &Corrector {
        self.sweeper.corrector()
    }

    pub fn run(&self, scope: BatchScope) -> BatchReport {
        match scope {
            BatchScope::HoursBack(hours) => self.fix_recent_applications(hours),
            BatchScope::Ids(ids) => self.fix_ids(&ids),
        }
    }

    pub fn fix_application(&self, app_id: &str) -> FixResult {
        match self.corrector().apply_by_id(app_id) {
            Ok(c) => FixResult::from_correction(&c),
            Err(e) => {
                log::warn!("rpc: fix_application {app_id} failed: {e}");
                FixResult::from_error(app_id, &e)
            }
        }
    }

    pub fn fix_recent_applications(&self, hours_back: u32) -> BatchReport {
        if hours_back == 0 {
            return BatchReport::failed(Some(0), "hours_back must be at least 1".into());
        }
        let result = hours_back_start(self.corrector().clock().now(), hours_back)
            .and_then(|since| self.sweeper.sweep_since(since));
        match result {
            Ok(summary) => {
                summary.log();
                BatchReport::from_summary(summary, Some(hours_back))
            }
            Err(e) => {
                log::error!("batch: fix_recent_applications({hours_back}) failed: {e}");
                BatchReport::failed(Some(hours_back), e.to_string())
            }
        }
    }

    pub fn fix_ids(&self, ids: &[String]) -> BatchReport {
        let summary = scan_ids(self.corrector(), ids);
        summary.log();
        BatchReport::from_summary(summary, None)
    }
}
