//! Role-driven access policies for bulk operations.
//!
//! An [`AccessPolicy`] describes what a principal may reach independently of
//! any single resource: which regions, ownership types and data classes,
//! which operations, and which fields are masked or forbidden. It is the input
//! to row-level security ([`crate::enforcement`]).

use std::collections::BTreeSet;

use fleetgate_types::{
    DataClassification, OwnershipType, PartialResourceContext, PiiScope, Principal, PrincipalId,
    RegionId, Role,
};
use serde::{Deserialize, Serialize};

use crate::fields;
use crate::masking::{FieldProjector, forbidden_fields_for, masked_fields_for};
use crate::matrix::OwnershipAccessMatrix;
use crate::roles::RoleCapabilities;

/// Field-level restrictions carried by a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRestrictions {
    /// Catalogued fields visible in clear.
    pub allowed: BTreeSet<String>,
    /// Catalogued fields returned in masked form.
    pub masked: BTreeSet<String>,
    /// Catalogued fields never returned or written.
    pub forbidden: BTreeSet<String>,
}

impl FieldRestrictions {
    /// Builds restrictions for a PII scope and role.
    ///
    /// The three sets partition the field catalog; a field both masked and
    /// forbidden is forbidden.
    pub fn for_principal(pii_scope: PiiScope, role: Role) -> Self {
        let forbidden = forbidden_fields_for(pii_scope, role);
        let masked: BTreeSet<String> = masked_fields_for(pii_scope, role)
            .difference(&forbidden)
            .cloned()
            .collect();
        let allowed = fields::catalog()
            .filter(|f| !masked.contains(*f) && !forbidden.contains(*f))
            .map(str::to_string)
            .collect();

        Self {
            allowed,
            masked,
            forbidden,
        }
    }

    /// Returns a projector applying these restrictions.
    pub fn projector(&self) -> FieldProjector {
        FieldProjector::new(self.masked.clone(), self.forbidden.clone())
    }
}

/// Access policy for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Principal this policy was derived for.
    pub principal_id: PrincipalId,

    /// Role this policy was derived from.
    pub role: Role,

    pub can_read: bool,
    pub can_write: bool,
    pub can_delete: bool,

    /// Regions in reach. Contains [`RegionId::WILDCARD`] for unrestricted
    /// principals.
    pub allowed_regions: BTreeSet<RegionId>,

    pub allowed_ownership_types: BTreeSet<OwnershipType>,

    pub allowed_data_classes: BTreeSet<DataClassification>,

    pub field_restrictions: FieldRestrictions,

    /// Step-up authentication is needed because restricted data is in reach.
    pub requires_mfa: bool,

    pub audit_required: bool,
}

impl AccessPolicy {
    /// Returns whether `region` is within the policy's regions.
    pub fn covers_region(&self, region: &RegionId) -> bool {
        self.allowed_regions.iter().any(RegionId::is_wildcard) || self.allowed_regions.contains(region)
    }

    /// Returns whether every region is in reach.
    pub fn has_all_regions(&self) -> bool {
        self.allowed_regions.iter().any(RegionId::is_wildcard)
    }

    /// Returns whether no row can match this policy.
    pub fn is_empty_scope(&self) -> bool {
        self.allowed_regions.is_empty()
            || self.allowed_ownership_types.is_empty()
            || self.allowed_data_classes.is_empty()
    }
}

/// Returns the data classes a principal may see.
///
/// Public and internal data are open to everyone; confidential data needs a
/// data steward; restricted data needs a data steward with full PII scope.
pub fn data_classes_for(role: Role, pii_scope: PiiScope) -> BTreeSet<DataClassification> {
    let mut classes = BTreeSet::from([DataClassification::Public, DataClassification::Internal]);
    if role.is_data_steward() {
        classes.insert(DataClassification::Confidential);
        if pii_scope == PiiScope::Full {
            classes.insert(DataClassification::Restricted);
        }
    }
    classes
}

/// Derives the access policy for `principal`, narrowed by whatever is known
/// about the target resources.
///
/// A narrowing value outside the principal's reach yields an empty set for
/// that dimension, so the resulting policy matches nothing.
pub fn get_access_policy(
    matrix: &OwnershipAccessMatrix,
    principal: &Principal,
    context: &PartialResourceContext,
) -> AccessPolicy {
    let role = principal.role;

    let mut allowed_regions = principal.regions.clone();
    if let Some(region) = &context.region_id {
        let in_reach = principal.has_all_regions() || principal.regions.contains(region);
        allowed_regions = if in_reach {
            BTreeSet::from([region.clone()])
        } else {
            BTreeSet::new()
        };
    }

    let mut allowed_ownership_types = matrix.ownership_types_for(role);
    if let Some(ownership) = context.ownership_type {
        allowed_ownership_types.retain(|o| *o == ownership);
    }

    let mut allowed_data_classes = data_classes_for(role, principal.pii_scope);
    if let Some(classification) = context.data_classification {
        allowed_data_classes.retain(|c| *c == classification);
    }

    let requires_mfa = allowed_data_classes.contains(&DataClassification::Restricted);

    let policy = AccessPolicy {
        principal_id: principal.id.clone(),
        role,
        can_read: role.can_read(),
        can_write: role.can_write(),
        can_delete: role.can_delete(),
        allowed_regions,
        allowed_ownership_types,
        allowed_data_classes,
        field_restrictions: FieldRestrictions::for_principal(principal.pii_scope, role),
        requires_mfa,
        audit_required: true,
    };

    tracing::debug!(
        principal = %principal.id,
        role = %role,
        regions = policy.allowed_regions.len(),
        ownership_types = policy.allowed_ownership_types.len(),
        empty_scope = policy.is_empty_scope(),
        "Access policy derived"
    );

    policy
}
