//! Ownership access matrix.
//!
//! For each [`OwnershipType`] the matrix places every [`Action`] in exactly
//! one [`Tier`], and names the roles authorized for each tier. Role sets are
//! nested (`restricted ⊆ financial ⊆ detailed ⊆ basic`), so privilege is
//! monotonic: a role authorized for a tier is authorized for every tier
//! below it.
//!
//! A matrix can only be obtained through validation ([`OwnershipAccessMatrix::new`],
//! [`OwnershipAccessMatrix::default_matrix`], or deserialization), and is
//! immutable afterwards.
//!
//! ## Document format
//!
//! ```toml
//! [fleet_owned.actions]
//! basic = ["view_vehicles_basic", "view_vehicle_status"]
//! detailed = ["view_vehicles_detailed"]
//! financial = []
//! restricted = []
//!
//! [fleet_owned.roles]
//! basic = ["ground_ops", "executive"]
//! detailed = ["executive"]
//! financial = ["executive"]
//! restricted = ["executive"]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use fleetgate_types::{Action, OwnershipType, Role, Tier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when a matrix fails its startup self-check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// An ownership type has no row.
    #[error("ownership type '{ownership}' has no matrix row")]
    MissingOwnershipRow { ownership: OwnershipType },

    /// An action is not placed in any tier of a row.
    #[error("action '{action}' is missing from the '{ownership}' row")]
    MissingAction {
        ownership: OwnershipType,
        action: Action,
    },

    /// An action is placed in two tiers of the same row.
    #[error("action '{action}' appears in both '{first}' and '{second}' tiers of '{ownership}'")]
    DuplicateAction {
        ownership: OwnershipType,
        action: Action,
        first: Tier,
        second: Tier,
    },

    /// A role is authorized for a tier but not for a tier below it.
    #[error("role '{role}' is authorized for '{tier}' but not '{lower}' in '{ownership}'")]
    NonMonotonicTiers {
        ownership: OwnershipType,
        role: Role,
        tier: Tier,
        lower: Tier,
    },

    /// The matrix document could not be read or parsed.
    #[error("invalid matrix document: {0}")]
    InvalidDocument(String),
}

/// One set of members per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de> + Ord"
))]
pub struct TierSets<T: Ord> {
    #[serde(default)]
    pub basic: BTreeSet<T>,
    #[serde(default)]
    pub detailed: BTreeSet<T>,
    #[serde(default)]
    pub financial: BTreeSet<T>,
    #[serde(default)]
    pub restricted: BTreeSet<T>,
}

impl<T: Ord> Default for TierSets<T> {
    fn default() -> Self {
        Self {
            basic: BTreeSet::new(),
            detailed: BTreeSet::new(),
            financial: BTreeSet::new(),
            restricted: BTreeSet::new(),
        }
    }
}

impl<T: Ord> TierSets<T> {
    /// Returns the members of `tier`.
    pub fn get(&self, tier: Tier) -> &BTreeSet<T> {
        match tier {
            Tier::Basic => &self.basic,
            Tier::Detailed => &self.detailed,
            Tier::Financial => &self.financial,
            Tier::Restricted => &self.restricted,
        }
    }

    fn get_mut(&mut self, tier: Tier) -> &mut BTreeSet<T> {
        match tier {
            Tier::Basic => &mut self.basic,
            Tier::Detailed => &mut self.detailed,
            Tier::Financial => &mut self.financial,
            Tier::Restricted => &mut self.restricted,
        }
    }

    /// Returns the first tier containing `member`.
    pub fn tier_of(&self, member: &T) -> Option<Tier> {
        Tier::ALL
            .iter()
            .copied()
            .find(|tier| self.get(*tier).contains(member))
    }
}

/// Tier placement of actions and authorized roles for one ownership type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRow {
    pub actions: TierSets<Action>,
    pub roles: TierSets<Role>,
}

/// Validated, immutable ownership access matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<OwnershipType, OwnershipRow>",
    into = "BTreeMap<OwnershipType, OwnershipRow>"
)]
pub struct OwnershipAccessMatrix {
    rows: BTreeMap<OwnershipType, OwnershipRow>,
}

impl OwnershipAccessMatrix {
    /// Validates `rows` and builds a matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if an ownership type has no row, an
    /// action is missing from a row or placed in two tiers, or role sets are
    /// not nested.
    pub fn new(rows: BTreeMap<OwnershipType, OwnershipRow>) -> Result<Self, ConfigurationError> {
        validate(&rows)?;
        Ok(Self { rows })
    }

    /// Parses and validates a JSON matrix document.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigurationError> {
        let rows: BTreeMap<OwnershipType, OwnershipRow> = serde_json::from_str(document)
            .map_err(|e| ConfigurationError::InvalidDocument(e.to_string()))?;
        Self::new(rows)
    }

    /// Builds the built-in fleet matrix.
    pub fn default_matrix() -> Result<Self, ConfigurationError> {
        Self::new(default_rows())
    }

    /// Returns the row for an ownership type.
    pub fn row(&self, ownership: OwnershipType) -> Option<&OwnershipRow> {
        self.rows.get(&ownership)
    }

    /// Returns every row.
    pub fn rows(&self) -> &BTreeMap<OwnershipType, OwnershipRow> {
        &self.rows
    }

    /// Returns the tier holding `action` for `ownership`.
    pub fn tier_of(&self, ownership: OwnershipType, action: Action) -> Option<Tier> {
        self.row(ownership)?.actions.tier_of(&action)
    }

    /// Returns whether `role` is authorized for `tier` of `ownership`.
    pub fn authorizes(&self, role: Role, ownership: OwnershipType, tier: Tier) -> bool {
        self.row(ownership)
            .is_some_and(|row| row.roles.get(tier).contains(&role))
    }

    /// Returns the tier granted to `role` for `action` on `ownership`.
    ///
    /// `None` means the ownership gate denies: the row or action is missing,
    /// or the role is not authorized for the action's tier.
    pub fn grant(&self, role: Role, ownership: OwnershipType, action: Action) -> Option<Tier> {
        let tier = self.tier_of(ownership, action)?;
        self.authorizes(role, ownership, tier).then_some(tier)
    }

    /// Returns the highest tier `role` holds for `ownership`.
    pub fn highest_tier(&self, role: Role, ownership: OwnershipType) -> Option<Tier> {
        Tier::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| self.authorizes(role, ownership, *tier))
    }

    /// Returns the ownership types in which `role` holds at least the basic tier.
    pub fn ownership_types_for(&self, role: Role) -> BTreeSet<OwnershipType> {
        OwnershipType::ALL
            .iter()
            .copied()
            .filter(|ownership| self.authorizes(role, *ownership, Tier::Basic))
            .collect()
    }
}

impl TryFrom<BTreeMap<OwnershipType, OwnershipRow>> for OwnershipAccessMatrix {
    type Error = ConfigurationError;

    fn try_from(rows: BTreeMap<OwnershipType, OwnershipRow>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<OwnershipAccessMatrix> for BTreeMap<OwnershipType, OwnershipRow> {
    fn from(matrix: OwnershipAccessMatrix) -> Self {
        matrix.rows
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate(rows: &BTreeMap<OwnershipType, OwnershipRow>) -> Result<(), ConfigurationError> {
    for &ownership in OwnershipType::ALL {
        let row = rows
            .get(&ownership)
            .ok_or(ConfigurationError::MissingOwnershipRow { ownership })?;

        let mut placed: BTreeMap<Action, Tier> = BTreeMap::new();
        for &tier in Tier::ALL {
            for &action in row.actions.get(tier) {
                if let Some(first) = placed.insert(action, tier) {
                    return Err(ConfigurationError::DuplicateAction {
                        ownership,
                        action,
                        first,
                        second: tier,
                    });
                }
            }
        }

        if let Some(&action) = Action::ALL.iter().find(|a| !placed.contains_key(*a)) {
            return Err(ConfigurationError::MissingAction { ownership, action });
        }

        // Each tier's roles must appear in the tier directly below.
        for pair in Tier::ALL.windows(2) {
            let (lower, tier) = (pair[0], pair[1]);
            if let Some(&role) = row
                .roles
                .get(tier)
                .iter()
                .find(|role| !row.roles.get(lower).contains(*role))
            {
                return Err(ConfigurationError::NonMonotonicTiers {
                    ownership,
                    role,
                    tier,
                    lower,
                });
            }
        }
    }

    Ok(())
}

// ============================================================================
// Built-in matrix
// ============================================================================

fn default_actions() -> TierSets<Action> {
    let mut sets = TierSets::default();
    for &action in Action::ALL {
        let tier = match action {
            Action::ViewVehiclesBasic
            | Action::ViewVehicleLocation
            | Action::ViewVehicleStatus
            | Action::UpdateVehicleStatus
            | Action::AssignDriver
            | Action::ViewMaintenanceSchedule
            | Action::ScheduleMaintenance
            | Action::ViewVehicleDocuments
            | Action::ReportVehicleIssue
            | Action::ViewTripHistory => Tier::Basic,

            Action::ViewVehiclesDetailed
            | Action::ViewVehicleTelemetry
            | Action::ViewDriverAssignments
            | Action::ManageVehicleDocuments
            | Action::ViewMaintenanceHistory
            | Action::ApproveMaintenance
            | Action::ExportFleetReports
            | Action::ViewUtilizationAnalytics
            | Action::ModifyVehicleProfile
            | Action::ViewComplianceRecords => Tier::Detailed,

            Action::ViewVehicleFinancials
            | Action::ViewOperatingCosts
            | Action::ViewRevenueReports
            | Action::ApproveVehiclePurchases
            | Action::ApproveVehicleSales
            | Action::ManageLeaseAgreements
            | Action::ProcessInsuranceClaims
            | Action::AdjustDriverPayouts
            | Action::ApproveMajorRepairs
            | Action::ManageFuelCards => Tier::Financial,

            Action::InvestigateVehicleIncidents
            | Action::AccessIncidentEvidence
            | Action::ViewDriverPii
            | Action::TransferVehicleOwnership
            | Action::DecommissionVehicle
            | Action::OverrideVehicleLock
            | Action::ExportRawTelemetry
            | Action::ManageAccessOverrides
            | Action::BulkDeleteVehicleRecords
            | Action::AuditFleetAccess => Tier::Restricted,
        };
        sets.get_mut(tier).insert(action);
    }
    sets
}

fn move_action(sets: &mut TierSets<Action>, action: Action, to: Tier) {
    for &tier in Tier::ALL {
        sets.get_mut(tier).remove(&action);
    }
    sets.get_mut(to).insert(action);
}

fn platform_roles() -> TierSets<Role> {
    TierSets {
        basic: [
            Role::GroundOps,
            Role::OpsManager,
            Role::RegionalManager,
            Role::Executive,
            Role::Support,
            Role::RiskInvestigator,
            Role::Analyst,
            Role::FinanceOps,
        ]
        .into(),
        detailed: [
            Role::OpsManager,
            Role::RegionalManager,
            Role::Executive,
            Role::Support,
            Role::RiskInvestigator,
            Role::Analyst,
            Role::FinanceOps,
        ]
        .into(),
        financial: [
            Role::RegionalManager,
            Role::Executive,
            Role::RiskInvestigator,
            Role::FinanceOps,
        ]
        .into(),
        restricted: [Role::Executive, Role::RiskInvestigator].into(),
    }
}

fn default_rows() -> BTreeMap<OwnershipType, OwnershipRow> {
    let platform = OwnershipRow {
        actions: default_actions(),
        roles: platform_roles(),
    };

    let mut fleet = platform.clone();
    fleet.roles.basic.insert(Role::Driver);
    fleet.roles.basic.insert(Role::Operator);

    let mut operator = fleet.clone();
    move_action(&mut operator.actions, Action::ViewOperatingCosts, Tier::Detailed);

    let mut driver = platform.clone();
    driver.roles.basic.insert(Role::Driver);
    driver.roles.detailed.remove(&Role::Analyst);
    move_action(&mut driver.actions, Action::ViewVehicleLocation, Tier::Detailed);
    move_action(&mut driver.actions, Action::ViewTripHistory, Tier::Detailed);
    move_action(&mut driver.actions, Action::ViewVehicleTelemetry, Tier::Restricted);

    BTreeMap::from([
        (OwnershipType::PlatformOwned, platform),
        (OwnershipType::FleetOwned, fleet),
        (OwnershipType::OperatorOwned, operator),
        (OwnershipType::DriverOwned, driver),
    ])
}
