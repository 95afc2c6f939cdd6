//! ProductSync: second derived-field rule, copying the product listing
//! (url, title, image, price) from a SourcePlan onto its `producto`
//! Application.
//!
//! Same shape as the Corrector: read current state, compare, then a
//! conditional write scoped by id. Runs after financing_type has
//! converged; an application that is not `producto` yet is skipped and
//! picked up on a later pass.

use crate::{
    clock::Clock,
    corrector::Corrector,
    error::{ReconError, ReconResult},
    mapping::FinancingType,
    store::ApplicationStore,
    types::{short_id, Application, ProductDetails},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSyncReason {
    NotApplicable,
    /// financing_type is not `producto`.
    NotProduct,
    SourceNotReady,
    /// The plan has no url, title or image to copy.
    NoListing,
    AlreadySynced,
    Synced,
    ConcurrentlySynced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSyncResult {
    pub application_id: String,
    pub updated: bool,
    pub reason: ProductSyncReason,
    pub before: ProductDetails,
    pub after: ProductDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSyncSummary {
    pub success: bool,
    pub candidates: usize,
    pub synced: usize,
    pub already_synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ProductSyncResult>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct ProductSync {
    store: Arc<dyn ApplicationStore>,
    clock: Arc<dyn Clock>,
}

impl ProductSync {
    pub fn new(store: Arc<dyn ApplicationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Share the store and clock of an existing Corrector.
    pub fn from_corrector(corrector: &Corrector) -> Self {
        Self::new(corrector.store_handle(), corrector.clock_handle())
    }

    pub fn apply(&self, app: &Application) -> ReconResult<ProductSyncResult> {
        let mut result = ProductSyncResult {
            application_id: app.id.clone(),
            updated: false,
            reason: ProductSyncReason::NotApplicable,
            before: app.product.clone(),
            after: app.product.clone(),
        };

        let Some(source_id) = app.source_id.as_deref().filter(|_| app.is_reconcilable()) else {
            return Ok(result);
        };
        if app.financing_type.as_deref() != Some(FinancingType::Producto.as_str()) {
            result.reason = ProductSyncReason::NotProduct;
            return Ok(result);
        }

        let plan = self
            .store
            .source_plan(source_id)
            .map_err(|e| ReconError::lookup(source_id, e))?;
        let Some(plan) = plan else {
            result.reason = ProductSyncReason::SourceNotReady;
            return Ok(result);
        };
        if !plan.product.has_listing() {
            result.reason = ProductSyncReason::NoListing;
            return Ok(result);
        }
        if plan.product == app.product {
            result.reason = ProductSyncReason::AlreadySynced;
            return Ok(result);
        }

        let written = self
            .store
            .set_product_details(&app.id, &plan.product, self.clock.now())
            .map_err(|e| ReconError::write(&app.id, e))?;
        if written {
            log::info!(
                "product sync: {} listing copied from {}",
                short_id(&app.id),
                short_id(source_id)
            );
            result.updated = true;
            result.reason = ProductSyncReason::Synced;
        } else {
            result.reason = ProductSyncReason::ConcurrentlySynced;
        }
        result.after = plan.product;
        Ok(result)
    }

    pub fn apply_by_id(&self, id: &str) -> ReconResult<ProductSyncResult> {
        let app = self
            .store
            .get_application(id)?
            .ok_or_else(|| ReconError::ApplicationNotFound { id: id.to_string() })?;
        self.apply(&app)
    }

    /// One pass over every `producto` application with an incomplete
    /// listing. A per-record failure is counted and the pass continues.
    pub fn sync_pending(&self) -> ProductSyncSummary {
        let candidates = match self.store.product_sync_candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("product sync: candidate query failed: {e}");
                return ProductSyncSummary {
                    errors: vec![e.to_string()],
                    ..ProductSyncSummary::default()
                };
            }
        };

        let mut summary = ProductSyncSummary {
            success: true,
            candidates: candidates.len(),
            ..ProductSyncSummary::default()
        };
        for app in &candidates {
            match self.apply(app) {
                Ok(result) => {
                    match result.reason {
                        ProductSyncReason::Synced => summary.synced += 1,
                        ProductSyncReason::AlreadySynced | ProductSyncReason::ConcurrentlySynced => {
                            summary.already_synced += 1
                        }
                        _ => summary.skipped += 1,
                    }
                    summary.results.push(result);
                }
                Err(e) => {
                    log::warn!("product sync: {} failed: {e}", short_id(&app.id));
                    summary.failed += 1;
                    summary.errors.push(format!("{}: {e}", app.id));
                }
            }
        }
        log::info!(
            "product sync: candidates={} synced={} already_synced={} skipped={} failed={}",
            summary.candidates,
            summary.synced,
            summary.already_synced,
            summary.skipped,
            summary.failed
        );
        summary
    }
}
