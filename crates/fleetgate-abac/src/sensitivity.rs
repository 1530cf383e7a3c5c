//! Data sensitivity gate and step-up authentication.

use fleetgate_rbac::RoleCapabilities;
use fleetgate_types::{Action, DataClassification, PiiScope, Principal, ResourceContext};
use serde::{Deserialize, Serialize};

use crate::regional::RegionalGrant;

/// Reason the sensitivity gate refused a request.
///
/// Internal detail for logs. Callers only ever see the generic
/// `sensitivity` denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityViolation {
    /// The resource holds PII and the principal has no PII scope.
    PiiScopeRequired,
    /// Restricted data needs full PII scope.
    FullPiiRequired,
    /// Confidential and restricted data need a data steward.
    StewardRequired,
}

impl SensitivityViolation {
    pub fn as_str(self) -> &'static str {
        match self {
            SensitivityViolation::PiiScopeRequired => "pii_scope_required",
            SensitivityViolation::FullPiiRequired => "full_pii_required",
            SensitivityViolation::StewardRequired => "steward_required",
        }
    }
}

impl std::fmt::Display for SensitivityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks PII scope and classification requirements.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataSensitivityGate;

impl DataSensitivityGate {
    pub fn check(principal: &Principal, resource: &ResourceContext) -> Result<(), SensitivityViolation> {
        if resource.contains_pii && principal.pii_scope == PiiScope::None {
            return Err(SensitivityViolation::PiiScopeRequired);
        }

        let classification = resource.data_classification;
        if classification == DataClassification::Restricted && principal.pii_scope != PiiScope::Full {
            return Err(SensitivityViolation::FullPiiRequired);
        }

        if classification >= DataClassification::Confidential && !principal.role.is_data_steward() {
            return Err(SensitivityViolation::StewardRequired);
        }

        Ok(())
    }

    /// Returns whether step-up authentication is required for an allowed
    /// request.
    pub fn requires_mfa(action: Action, resource: &ResourceContext, regional: RegionalGrant) -> bool {
        action.is_financial_critical()
            || action.is_decommission()
            || resource.data_classification == DataClassification::Restricted
            || regional.is_override()
    }
}
