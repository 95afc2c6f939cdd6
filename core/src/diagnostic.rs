//! DiagnosticProbe: read-only consistency audit over `selected_plans`
//! applications. Used for monitoring and as a test oracle. Never writes.

use crate::{
    corrector::{Corrector, Evaluation},
    error::ReconResult,
    mapping::{is_legacy_spelling, FinancingType},
    sweep::hours_back_start,
    types::Application,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditScope {
    Full,
    /// Newest `n` applications.
    Sample(usize),
    /// Applications created in the last `n` hours.
    Window(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub id: String,
    pub current: Option<String>,
    pub expected: String,
    pub simulation_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub total: usize,
    pub correct: usize,
    /// SourcePlan is cash but financing_type is not `personal`.
    pub mismatched_cash: usize,
    /// SourcePlan is non-cash but financing_type is not `producto`.
    pub mismatched_product: usize,
    /// Subset of mismatches holding the legacy `produto` spelling.
    pub legacy_spelling: usize,
    pub unresolved: usize,
    pub lookup_errors: usize,
    pub not_applicable: usize,
    pub mismatches: Vec<Mismatch>,
}

impl DiagnosticReport {
    pub fn mismatched(&self) -> usize {
        self.mismatched_cash + self.mismatched_product
    }

    pub fn is_consistent(&self) -> bool {
        self.mismatched() == 0
    }
}

pub struct DiagnosticProbe {
    corrector: Corrector,
}

impl DiagnosticProbe {
    pub fn new(corrector: Corrector) -> Self {
        Self { corrector }
    }

    pub fn audit(&self, scope: AuditScope) -> ReconResult<DiagnosticReport> {
        let store = self.corrector.store();
        let apps = match scope {
            AuditScope::Full => store.selected_plan_applications(None)?,
            AuditScope::Sample(n) => store.selected_plan_applications(Some(n))?,
            AuditScope::Window(hours) => {
                let since = hours_back_start(self.corrector.clock().now(), hours)?;
                store.recent_candidates(since)?
            }
        };
        let report = self.audit_applications(&apps);
        log::info!(
            "diagnostic: total={} correct={} mismatched_cash={} mismatched_product={} \
             legacy_spelling={} unresolved={} lookup_errors={}",
            report.total,
            report.correct,
            report.mismatched_cash,
            report.mismatched_product,
            report.legacy_spelling,
            report.unresolved,
            report.lookup_errors,
        );
        Ok(report)
    }

    pub fn audit_applications(&self, apps: &[Application]) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();
        for app in apps {
            report.total += 1;
            match self.corrector.evaluate(app) {
                Ok(Evaluation::NotApplicable) => report.not_applicable += 1,
                Ok(Evaluation::SourceNotReady { .. }) => report.unresolved += 1,
                Ok(Evaluation::Correct { .. }) => report.correct += 1,
                Ok(Evaluation::Mismatch { target, simulation_type }) => {
                    match target {
                        FinancingType::Personal => report.mismatched_cash += 1,
                        FinancingType::Producto => report.mismatched_product += 1,
                    }
                    if is_legacy_spelling(app.financing_type.as_deref()) {
                        report.legacy_spelling += 1;
                    }
                    report.mismatches.push(Mismatch {
                        id: app.id.clone(),
                        current: app.financing_type.clone(),
                        expected: target.as_str().to_string(),
                        simulation_type,
                    });
                }
                Err(e) => {
                    log::warn!("diagnostic: {} lookup failed: {e}", app.id);
                    report.lookup_errors += 1;
                }
            }
        }
        report
    }
}
