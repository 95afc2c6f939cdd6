//! SyncTriggerHandler: best-effort fast path on the insert itself.
//!
//! Runs inside the store's insert transaction, before the new row is
//! visible. It can only rewrite the in-flight record. When the SourcePlan
//! is not readable yet (it often is not) it leaves the record untouched
//! and the async paths take over.
//!
//! When the record ends up `producto` and the plan carries a product
//! listing, the listing is copied onto the in-flight record as well.

use crate::{
    error::ReconResult,
    lookup::SourceLookup,
    mapping::{map_simulation_type, FinancingType, Mapping},
    types::{is_reconcilable, NewApplication, SourcePlan},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    NotApplicable,
    SourceNotReady,
    /// Lookup raised an error. Swallowed: this path is not the source of
    /// correctness.
    LookupFailed(String),
    AlreadyCorrect,
    Rewritten { from: Option<String>, to: String },
}

#[derive(Debug, Clone, Default)]
pub struct SyncTriggerHandler;

impl SyncTriggerHandler {
    pub fn new() -> Self {
        Self
    }

    /// `lookup` reads a SourcePlan through the inserting transaction.
    pub fn before_insert<F>(&self, record: &mut NewApplication, lookup: F) -> TriggerOutcome
    where
        F: FnOnce(&str) -> ReconResult<Option<SourcePlan>>,
    {
        let Some(source_id) = record
            .source_id
            .clone()
            .filter(|s| is_reconcilable(&record.application_type, Some(s.as_str())))
        else {
            return TriggerOutcome::NotApplicable;
        };

        let plan = match lookup(&source_id) {
            Ok(plan) => plan,
            Err(e) => {
                log::debug!("sync trigger: lookup for {source_id} failed: {e}");
                return TriggerOutcome::LookupFailed(e.to_string());
            }
        };
        let found = SourceLookup::from(plan.clone());

        let Mapping::Resolved(target) = map_simulation_type(found.simulation_type()) else {
            return TriggerOutcome::SourceNotReady;
        };

        if let Some(plan) =
            plan.filter(|p| target == FinancingType::Producto && p.product.has_listing())
        {
            record.product = plan.product;
        }

        if record.financing_type.as_deref() == Some(target.as_str()) {
            return TriggerOutcome::AlreadyCorrect;
        }

        let from = record.financing_type.replace(target.as_str().to_string());
        log::debug!(
            "sync trigger: in-flight financing_type {} -> {target}",
            from.as_deref().unwrap_or("<null>")
        );
        TriggerOutcome::Rewritten {
            from,
            to: target.as_str().to_string(),
        }
    }
}
