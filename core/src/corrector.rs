//! Corrector: the single idempotent apply-if-needed operation.
//!
//! Every path (sync trigger, change events, sweeps, RPC) funnels into
//! `Corrector::apply`. It recomputes the target from current store state
//! on every call and never caches, so concurrent or repeated calls for the
//! same record converge on the same value.
//!
//! Side effects: at most one conditional write per call, scoped by the
//! Application id. After convergence a call is a pure read.

use crate::{
    clock::Clock,
    error::{ReconError, ReconResult},
    lookup::{lookup_source, SourceLookup},
    mapping::{map_simulation_type, FinancingType, Mapping},
    store::ApplicationStore,
    types::{short_id, Application},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionReason {
    /// Not `selected_plans`, or no source_id.
    NotApplicable,
    /// SourcePlan missing or its simulation_type empty. Retry later.
    SourceNotReady,
    AlreadyCorrect,
    Corrected,
    /// The conditional write matched no row: another writer got there first.
    ConcurrentlyCorrected,
}

impl CorrectionReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            CorrectionReason::NotApplicable => "not applicable",
            CorrectionReason::SourceNotReady => "source not ready",
            CorrectionReason::AlreadyCorrect => "already correct",
            CorrectionReason::Corrected => "corrected",
            CorrectionReason::ConcurrentlyCorrected => "concurrently corrected",
        }
    }
}

impl fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub application_id: String,
    pub updated: bool,
    pub reason: CorrectionReason,
    pub old_financing_type: Option<String>,
    pub new_financing_type: Option<String>,
    pub simulation_type: Option<String>,
}

/// Read-only verdict for one Application against its SourcePlan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    NotApplicable,
    SourceNotReady { lookup: SourceLookup },
    Correct { target: FinancingType, simulation_type: String },
    Mismatch { target: FinancingType, simulation_type: String },
}

impl Evaluation {
    pub fn simulation_type(&self) -> Option<&str> {
        match self {
            Evaluation::Correct { simulation_type, .. }
            | Evaluation::Mismatch { simulation_type, .. } => Some(simulation_type),
            Evaluation::SourceNotReady { lookup } => lookup.simulation_type(),
            Evaluation::NotApplicable => None,
        }
    }
}

#[derive(Clone)]
pub struct Corrector {
    store: Arc<dyn ApplicationStore>,
    clock: Arc<dyn Clock>,
}

impl Corrector {
    pub fn new(store: Arc<dyn ApplicationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &dyn ApplicationStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn store_handle(&self) -> Arc<dyn ApplicationStore> {
        Arc::clone(&self.store)
    }

    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Compare an Application against its SourcePlan without writing.
    pub fn evaluate(&self, app: &Application) -> ReconResult<Evaluation> {
        let Some(source_id) = app.source_id.as_deref().filter(|_| app.is_reconcilable()) else {
            return Ok(Evaluation::NotApplicable);
        };

        let lookup = lookup_source(self.store(), source_id)?;
        let target = match map_simulation_type(lookup.simulation_type()) {
            Mapping::Resolved(target) => target,
            Mapping::Unresolved => return Ok(Evaluation::SourceNotReady { lookup }),
        };
        let simulation_type = lookup.simulation_type().unwrap_or_default().to_string();

        if app.financing_type.as_deref() == Some(target.as_str()) {
            Ok(Evaluation::Correct { target, simulation_type })
        } else {
            Ok(Evaluation::Mismatch { target, simulation_type })
        }
    }

    /// Bring one Application into line with its SourcePlan.
    ///
    /// Errors are `ReconError::Lookup` (SourcePlan read failed) or
    /// `ReconError::Write` (conditional update failed). Both are transient
    /// from the caller's point of view.
    pub fn apply(&self, app: &Application) -> ReconResult<Correction> {
        let evaluation = self.evaluate(app)?;
        let simulation_type = evaluation.simulation_type().map(str::to_string);
        let mut correction = Correction {
            application_id: app.id.clone(),
            updated: false,
            reason: CorrectionReason::NotApplicable,
            old_financing_type: app.financing_type.clone(),
            new_financing_type: app.financing_type.clone(),
            simulation_type,
        };

        match evaluation {
            Evaluation::NotApplicable => {}
            Evaluation::SourceNotReady { .. } => {
                correction.reason = CorrectionReason::SourceNotReady;
                log::debug!(
                    "corrector: {} source {:?} not ready",
                    short_id(&app.id),
                    app.source_id
                );
            }
            Evaluation::Correct { .. } => {
                correction.reason = CorrectionReason::AlreadyCorrect;
            }
            Evaluation::Mismatch { target, .. } => {
                let written = self
                    .store
                    .set_financing_type(&app.id, target.as_str(), self.clock.now())
                    .map_err(|e| ReconError::write(&app.id, e))?;
                correction.new_financing_type = Some(target.as_str().to_string());
                if written {
                    correction.updated = true;
                    correction.reason = CorrectionReason::Corrected;
                    log::info!(
                        "corrector: {} financing_type {} -> {} (simulation_type={})",
                        short_id(&app.id),
                        app.financing_type.as_deref().unwrap_or("<null>"),
                        target,
                        correction.simulation_type.as_deref().unwrap_or_default()
                    );
                } else {
                    correction.reason = CorrectionReason::ConcurrentlyCorrected;
                    log::debug!(
                        "corrector: {} already rewritten by another writer",
                        short_id(&app.id)
                    );
                }
            }
        }
        Ok(correction)
    }

    /// Re-read the Application by id, then apply. Use this whenever the
    /// caller's copy of the record might be stale.
    pub fn apply_by_id(&self, id: &str) -> ReconResult<Correction> {
        let app = self
            .store
            .get_application(id)?
            .ok_or_else(|| ReconError::ApplicationNotFound { id: id.to_string() })?;
        self.apply(&app)
    }
}
