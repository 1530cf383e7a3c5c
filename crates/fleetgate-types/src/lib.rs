//! # fleetgate-types: Core types for `Fleetgate`
//!
//! This crate contains shared types used across the `Fleetgate` system:
//! - Identifiers ([`PrincipalId`], [`ResourceId`], [`RegionId`], [`CaseId`])
//! - Closed policy enumerations ([`Role`], [`Action`], [`OwnershipType`],
//!   [`DataClassification`], [`PiiScope`], [`Tier`])
//! - Request attributes ([`Principal`], [`ResourceContext`], [`PartialResourceContext`])
//! - Evaluation output ([`Decision`], [`Condition`], [`AccessLevel`], [`DenialStep`])
//!
//! Every enumeration is closed: the string form of each variant is fixed, and
//! parsing an unknown name fails with [`UnknownVariant`] instead of silently
//! mapping to a default.

use std::{
    collections::BTreeSet,
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod decision;

pub use decision::{
    AccessLevel, Condition, ConditionKind, Decision, DenialPayload, DenialStep,
};

// ============================================================================
// Closed enumerations
// ============================================================================

/// Error returned when a string does not name a variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// The enum being parsed (e.g. `Role`).
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Declares a closed enum with a fixed wire name per variant.
///
/// Generates `ALL`, `as_str`, `Display` and `FromStr`, and pins the serde
/// name of each variant to the same string.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the wire name of this variant.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

closed_enum! {
    /// Primary role of a principal.
    ///
    /// Each principal holds exactly one role. Role capabilities (allow-lists,
    /// tier membership, data stewardship) live in `fleetgate-rbac`.
    pub enum Role {
        /// Field operations staff handling day-to-day vehicle movements.
        GroundOps => "ground_ops",
        /// Operations manager for one or more depots.
        OpsManager => "ops_manager",
        /// Manager accountable for a region.
        RegionalManager => "regional_manager",
        /// Executive with fleet-wide authority (top tier).
        Executive => "executive",
        /// Customer and driver support agent.
        Support => "support",
        /// Risk and incident investigator.
        RiskInvestigator => "risk_investigator",
        /// Read-mostly analytics user.
        Analyst => "analyst",
        /// Finance operations (payouts, leases, purchases).
        FinanceOps => "finance_ops",
        /// Driver operating an assigned vehicle.
        Driver => "driver",
        /// Independent operator running their own vehicles.
        Operator => "operator",
    }
}

closed_enum! {
    /// Which party owns a fleet resource.
    pub enum OwnershipType {
        /// Owned by the platform itself.
        PlatformOwned => "platform_owned",
        /// Owned by a fleet company.
        FleetOwned => "fleet_owned",
        /// Owned by an individual operator.
        OperatorOwned => "operator_owned",
        /// Owned by the driver.
        DriverOwned => "driver_owned",
    }
}

closed_enum! {
    /// Sensitivity classification of a resource's data.
    ///
    /// Variants are declared in increasing sensitivity, so the derived `Ord`
    /// doubles as the sensitivity ordering.
    pub enum DataClassification {
        /// Freely shareable.
        Public => "public",
        /// Internal operational data.
        Internal => "internal",
        /// Business-confidential data (financials, contracts).
        Confidential => "confidential",
        /// Highest sensitivity (investigations, identity documents).
        Restricted => "restricted",
    }
}

closed_enum! {
    /// How much personally identifiable information a principal may see.
    pub enum PiiScope {
        /// No PII at all.
        None => "none",
        /// PII only in masked form.
        Masked => "masked",
        /// Unmasked PII.
        Full => "full",
    }
}

closed_enum! {
    /// Privilege tier of an action within an ownership-type row.
    ///
    /// Ordered from least to most privileged.
    pub enum Tier {
        /// Basic operational visibility.
        Basic => "basic",
        /// Detailed operational data.
        Detailed => "detailed",
        /// Financial operations.
        Financial => "financial",
        /// Restricted operations (investigations, ownership transfer).
        Restricted => "restricted",
    }
}

impl Tier {
    /// Returns the access level granted by an action in this tier.
    pub fn access_level(self) -> AccessLevel {
        match self {
            Tier::Basic => AccessLevel::Basic,
            Tier::Detailed => AccessLevel::Detailed,
            Tier::Financial => AccessLevel::Financial,
            Tier::Restricted => AccessLevel::Full,
        }
    }

    /// Returns every tier at or below this one.
    pub fn and_below(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.iter().copied().filter(move |t| *t <= self)
    }
}

closed_enum! {
    /// A fleet-management operation a principal may attempt.
    pub enum Action {
        // -- Vehicle operations --
        ViewVehiclesBasic => "view_vehicles_basic",
        ViewVehicleLocation => "view_vehicle_location",
        ViewVehicleStatus => "view_vehicle_status",
        UpdateVehicleStatus => "update_vehicle_status",
        AssignDriver => "assign_driver",
        ViewMaintenanceSchedule => "view_maintenance_schedule",
        ScheduleMaintenance => "schedule_maintenance",
        ViewVehicleDocuments => "view_vehicle_documents",
        ReportVehicleIssue => "report_vehicle_issue",
        ViewTripHistory => "view_trip_history",

        // -- Detailed operations --
        ViewVehiclesDetailed => "view_vehicles_detailed",
        ViewVehicleTelemetry => "view_vehicle_telemetry",
        ViewDriverAssignments => "view_driver_assignments",
        ManageVehicleDocuments => "manage_vehicle_documents",
        ViewMaintenanceHistory => "view_maintenance_history",
        ApproveMaintenance => "approve_maintenance",
        ExportFleetReports => "export_fleet_reports",
        ViewUtilizationAnalytics => "view_utilization_analytics",
        ModifyVehicleProfile => "modify_vehicle_profile",
        ViewComplianceRecords => "view_compliance_records",

        // -- Financial operations --
        ViewVehicleFinancials => "view_vehicle_financials",
        ViewOperatingCosts => "view_operating_costs",
        ViewRevenueReports => "view_revenue_reports",
        ApproveVehiclePurchases => "approve_vehicle_purchases",
        ApproveVehicleSales => "approve_vehicle_sales",
        ManageLeaseAgreements => "manage_lease_agreements",
        ProcessInsuranceClaims => "process_insurance_claims",
        AdjustDriverPayouts => "adjust_driver_payouts",
        ApproveMajorRepairs => "approve_major_repairs",
        ManageFuelCards => "manage_fuel_cards",

        // -- Restricted operations --
        InvestigateVehicleIncidents => "investigate_vehicle_incidents",
        AccessIncidentEvidence => "access_incident_evidence",
        ViewDriverPii => "view_driver_pii",
        TransferVehicleOwnership => "transfer_vehicle_ownership",
        DecommissionVehicle => "decommission_vehicle",
        OverrideVehicleLock => "override_vehicle_lock",
        ExportRawTelemetry => "export_raw_telemetry",
        ManageAccessOverrides => "manage_access_overrides",
        BulkDeleteVehicleRecords => "bulk_delete_vehicle_records",
        AuditFleetAccess => "audit_fleet_access",
    }
}

impl Action {
    /// Actions whose approval moves money or ownership.
    pub fn is_financial_critical(self) -> bool {
        matches!(
            self,
            Action::ApproveVehiclePurchases
                | Action::ApproveVehicleSales
                | Action::AdjustDriverPayouts
                | Action::ManageLeaseAgreements
                | Action::TransferVehicleOwnership
        )
    }

    /// Actions that retire vehicles or destroy records.
    pub fn is_decommission(self) -> bool {
        matches!(
            self,
            Action::DecommissionVehicle | Action::BulkDeleteVehicleRecords
        )
    }

    /// Actions that open an investigation-scoped grant.
    pub fn is_investigation(self) -> bool {
        matches!(
            self,
            Action::InvestigateVehicleIncidents | Action::AccessIncidentEvidence
        )
    }

    /// Major financial commitments that need a supervisor below the top tier.
    pub fn is_major_financial(self) -> bool {
        matches!(
            self,
            Action::ApproveVehiclePurchases
                | Action::ApproveVehicleSales
                | Action::TransferVehicleOwnership
                | Action::ApproveMajorRepairs
        )
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a fleet resource (vehicle, document, record).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an operating region (e.g. `NCR`, `CEB`).
///
/// The reserved identifier `*` is the wildcard and grants every region when
/// held by a principal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// The wildcard region identifier.
    pub const WILDCARD: &'static str = "*";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the wildcard region.
    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    /// Returns whether this identifier is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an open investigation or support case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Request attributes
// ============================================================================

/// The authenticated actor attempting an operation.
///
/// Built per request from the upstream session resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
    /// Regions the principal may act in. May contain [`RegionId::WILDCARD`].
    pub regions: BTreeSet<RegionId>,
    pub pii_scope: PiiScope,
}

impl Principal {
    /// Creates a principal with no regions and no PII access.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: PrincipalId::new(id),
            role,
            regions: BTreeSet::new(),
            pii_scope: PiiScope::None,
        }
    }

    /// Adds a region to the principal's scope.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.regions.insert(RegionId::new(region));
        self
    }

    /// Grants every region.
    pub fn with_all_regions(mut self) -> Self {
        self.regions.insert(RegionId::wildcard());
        self
    }

    /// Sets the PII scope.
    pub fn with_pii_scope(mut self, scope: PiiScope) -> Self {
        self.pii_scope = scope;
        self
    }

    /// Returns whether the principal holds the wildcard region.
    pub fn has_all_regions(&self) -> bool {
        self.regions.iter().any(RegionId::is_wildcard)
    }
}

/// Already-resolved attributes of the resource being accessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContext {
    pub resource_id: ResourceId,
    pub ownership_type: OwnershipType,
    pub region_id: RegionId,
    pub data_classification: DataClassification,
    pub contains_pii: bool,
    /// Open case that justifies cross-region access for investigation roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
}

impl ResourceContext {
    /// Creates a context for an internal, PII-free resource.
    pub fn new(
        resource_id: impl Into<String>,
        ownership_type: OwnershipType,
        region_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: ResourceId::new(resource_id),
            ownership_type,
            region_id: RegionId::new(region_id),
            data_classification: DataClassification::Internal,
            contains_pii: false,
            case_id: None,
        }
    }

    /// Sets the data classification.
    pub fn with_classification(mut self, classification: DataClassification) -> Self {
        self.data_classification = classification;
        self
    }

    /// Marks the resource as containing PII.
    pub fn with_pii(mut self) -> Self {
        self.contains_pii = true;
        self
    }

    /// Attaches a case identifier.
    pub fn with_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(CaseId::new(case_id));
        self
    }
}

/// Resource attributes known ahead of a bulk query.
///
/// Every field is optional; `None` means "any value the principal may see".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartialResourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_type: Option<OwnershipType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_classification: Option<DataClassification>,
}

impl PartialResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ownership(mut self, ownership_type: OwnershipType) -> Self {
        self.ownership_type = Some(ownership_type);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region_id = Some(RegionId::new(region));
        self
    }

    pub fn with_classification(mut self, classification: DataClassification) -> Self {
        self.data_classification = Some(classification);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
