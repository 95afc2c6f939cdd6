//! SourceLookup: resolve the `simulation_type` behind an Application's
//! `source_id`.
//!
//! "Not found" is a normal outcome: the SourcePlan may not have been
//! committed yet. Transport errors are returned as `ReconError::Lookup`
//! and are retried by the next scheduled invocation, never here.

use crate::{
    error::{ReconError, ReconResult},
    store::ApplicationStore,
    types::SourcePlan,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLookup {
    /// The SourcePlan row exists. `simulation_type` may still be empty.
    Found { simulation_type: Option<String> },
    NotFound,
}

impl SourceLookup {
    pub fn simulation_type(&self) -> Option<&str> {
        match self {
            SourceLookup::Found { simulation_type } => simulation_type.as_deref(),
            SourceLookup::NotFound => None,
        }
    }
}

impl From<Option<SourcePlan>> for SourceLookup {
    fn from(plan: Option<SourcePlan>) -> Self {
        match plan {
            Some(plan) => SourceLookup::Found {
                simulation_type: plan.simulation_type,
            },
            None => SourceLookup::NotFound,
        }
    }
}

pub fn lookup_source(store: &dyn ApplicationStore, source_id: &str) -> ReconResult<SourceLookup> {
    store
        .source_plan(source_id)
        .map(SourceLookup::from)
        .map_err(|e| ReconError::lookup(source_id, e))
}
