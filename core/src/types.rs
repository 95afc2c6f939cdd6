//! Shared primitive types and records used across the reconciliation engine.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique identifier of an Application row.
pub type ApplicationId = String;

/// Opaque unique identifier of a SourcePlan row.
pub type SourcePlanId = String;

/// The only `application_type` this engine reconciles.
pub const SELECTED_PLANS: &str = "selected_plans";

/// A committed Application as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub application_type: String,
    pub source_id: Option<SourcePlanId>,
    pub financing_type: Option<String>,
    /// Copied from the SourcePlan for `producto` applications.
    #[serde(default)]
    pub product: ProductDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// True when this record falls under the financing_type invariant.
    pub fn is_reconcilable(&self) -> bool {
        is_reconcilable(&self.application_type, self.source_id.as_deref())
    }
}

/// The plan/simulation record a `selected_plans` Application points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePlan {
    pub id: SourcePlanId,
    pub simulation_type: Option<String>,
    #[serde(default)]
    pub product: ProductDetails,
}

impl SourcePlan {
    pub fn new(id: &str, simulation_type: Option<&str>) -> Self {
        Self {
            id: id.into(),
            simulation_type: simulation_type.map(str::to_string),
            product: ProductDetails::default(),
        }
    }

    pub fn with_product(mut self, product: ProductDetails) -> Self {
        self.product = product;
        self
    }
}

/// Product listing carried by a plan and mirrored onto its application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub url: Option<String>,
    pub title: Option<String>,
    pub image: Option<String>,
    pub price: Option<f64>,
}

impl ProductDetails {
    /// A plan with none of url, title or image has nothing worth copying.
    /// Price alone does not count.
    pub fn has_listing(&self) -> bool {
        self.url.is_some() || self.title.is_some() || self.image.is_some()
    }

    /// True when any of url, title or image is still unset.
    pub fn is_incomplete(&self) -> bool {
        self.url.is_none() || self.title.is_none() || self.image.is_none()
    }
}

/// An Application that has not been written yet.
/// `id` is generated on insert when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    pub id: Option<ApplicationId>,
    pub application_type: String,
    pub source_id: Option<SourcePlanId>,
    pub financing_type: Option<String>,
    #[serde(default)]
    pub product: ProductDetails,
}

impl NewApplication {
    pub fn selected_plan(source_id: &str, financing_type: Option<&str>) -> Self {
        Self {
            id: None,
            application_type: SELECTED_PLANS.into(),
            source_id: Some(source_id.into()),
            financing_type: financing_type.map(str::to_string),
            product: ProductDetails::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Shared applicability filter: `selected_plans` with a non-empty source_id.
pub fn is_reconcilable(application_type: &str, source_id: Option<&str>) -> bool {
    application_type == SELECTED_PLANS && source_id.is_some_and(|s| !s.trim().is_empty())
}

/// Canonical timestamp encoding. Fixed-width UTC with milliseconds, so
/// string order in the store equals chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// First 8 characters of an id, for log lines.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
