//! MappingRule: `simulation_type` → `financing_type`.
//!
//! Pure and total. `"cash"` maps to `"personal"`, every other non-empty
//! value maps to `"producto"`. An empty or missing value is unresolved:
//! the SourcePlan is treated as not ready yet rather than defaulted.
//!
//! `"produto"` is a legacy misspelling that some writers produced. It is
//! never emitted here; rows carrying it count as mismatches and get
//! rewritten to the canonical value.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingType {
    Personal,
    Producto,
}

impl FinancingType {
    pub const fn as_str(self) -> &'static str {
        match self {
            FinancingType::Personal => "personal",
            FinancingType::Producto => "producto",
        }
    }
}

impl fmt::Display for FinancingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy spelling of `producto` found in historical rows.
pub const LEGACY_PRODUCTO: &str = "produto";

/// Result of applying the rule to a raw `simulation_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    Resolved(FinancingType),
    Unresolved,
}

impl Mapping {
    pub fn target(self) -> Option<FinancingType> {
        match self {
            Mapping::Resolved(t) => Some(t),
            Mapping::Unresolved => None,
        }
    }
}

pub fn map_simulation_type(simulation_type: Option<&str>) -> Mapping {
    let Some(raw) = simulation_type.map(str::trim).filter(|s| !s.is_empty()) else {
        return Mapping::Unresolved;
    };
    if raw.eq_ignore_ascii_case("cash") {
        Mapping::Resolved(FinancingType::Personal)
    } else {
        Mapping::Resolved(FinancingType::Producto)
    }
}

/// True if `current` is the legacy spelling rather than a genuine mismatch.
pub fn is_legacy_spelling(current: Option<&str>) -> bool {
    current == Some(LEGACY_PRODUCTO)
}
