#![allow(clippy::match_same_arms)]
//! Role capabilities.
//!
//! [`Role`] itself is a closed enum in `fleetgate-types`; this module attaches
//! what each role may do:
//! - the explicit action allow-list checked by the first evaluation gate
//! - coarse read/write/delete capabilities used for bulk queries
//! - data stewardship (access to confidential and restricted data)
//! - cross-region override eligibility for case work

use fleetgate_types::{Action, Role};

/// Capabilities attached to a [`Role`].
pub trait RoleCapabilities {
    /// Returns the explicit allow-list of actions for this role.
    fn allowed_actions(&self) -> &'static [Action];

    /// Returns whether `action` is in this role's allow-list.
    fn permits(&self, action: Action) -> bool {
        self.allowed_actions().contains(&action)
    }

    /// Returns whether this role can read fleet records in bulk.
    fn can_read(&self) -> bool;

    /// Returns whether this role can create or modify fleet records.
    fn can_write(&self) -> bool;

    /// Returns whether this role can delete fleet records.
    fn can_delete(&self) -> bool;

    /// Returns whether this role may see confidential and restricted data.
    fn is_data_steward(&self) -> bool;

    /// Returns whether a case id lets this role act outside its regions.
    fn can_override_region(&self) -> bool;

    /// Returns whether this role is the top privilege tier.
    ///
    /// Major financial actions by any other role carry a supervisor
    /// approval condition.
    fn is_top_tier(&self) -> bool;
}

const GROUND_OPS: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::UpdateVehicleStatus,
    Action::AssignDriver,
    Action::ViewMaintenanceSchedule,
    Action::ScheduleMaintenance,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    // Raises procurement requests; approval depends on the ownership tier.
    Action::ApproveVehiclePurchases,
];

const OPS_MANAGER: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::UpdateVehicleStatus,
    Action::AssignDriver,
    Action::ViewMaintenanceSchedule,
    Action::ScheduleMaintenance,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewVehicleTelemetry,
    Action::ViewDriverAssignments,
    Action::ManageVehicleDocuments,
    Action::ViewMaintenanceHistory,
    Action::ApproveMaintenance,
    Action::ExportFleetReports,
    Action::ViewUtilizationAnalytics,
    Action::ModifyVehicleProfile,
    Action::ViewComplianceRecords,
    Action::ViewOperatingCosts,
    Action::ApproveMajorRepairs,
];

const REGIONAL_MANAGER: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::UpdateVehicleStatus,
    Action::AssignDriver,
    Action::ViewMaintenanceSchedule,
    Action::ScheduleMaintenance,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewVehicleTelemetry,
    Action::ViewDriverAssignments,
    Action::ManageVehicleDocuments,
    Action::ViewMaintenanceHistory,
    Action::ApproveMaintenance,
    Action::ExportFleetReports,
    Action::ViewUtilizationAnalytics,
    Action::ModifyVehicleProfile,
    Action::ViewComplianceRecords,
    Action::ViewVehicleFinancials,
    Action::ViewOperatingCosts,
    Action::ViewRevenueReports,
    Action::ApproveVehiclePurchases,
    Action::ApproveVehicleSales,
    Action::ManageLeaseAgreements,
    Action::ProcessInsuranceClaims,
    Action::AdjustDriverPayouts,
    Action::ApproveMajorRepairs,
    Action::ManageFuelCards,
];

const SUPPORT: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::ViewMaintenanceSchedule,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewDriverAssignments,
    Action::ViewMaintenanceHistory,
    Action::ViewComplianceRecords,
];

const RISK_INVESTIGATOR: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::ViewMaintenanceSchedule,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewVehicleTelemetry,
    Action::ViewDriverAssignments,
    Action::ViewMaintenanceHistory,
    Action::ExportFleetReports,
    Action::ViewComplianceRecords,
    Action::ViewVehicleFinancials,
    Action::ViewOperatingCosts,
    Action::ProcessInsuranceClaims,
    Action::InvestigateVehicleIncidents,
    Action::AccessIncidentEvidence,
    Action::ViewDriverPii,
    Action::OverrideVehicleLock,
    Action::ExportRawTelemetry,
    Action::AuditFleetAccess,
];

const ANALYST: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::ViewMaintenanceSchedule,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewVehicleTelemetry,
    Action::ViewMaintenanceHistory,
    Action::ExportFleetReports,
    Action::ViewUtilizationAnalytics,
    Action::ViewComplianceRecords,
    Action::ViewOperatingCosts,
    Action::ViewRevenueReports,
];

const FINANCE_OPS: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleStatus,
    Action::ViewVehicleDocuments,
    Action::ViewVehiclesDetailed,
    Action::ManageVehicleDocuments,
    Action::ExportFleetReports,
    Action::ViewUtilizationAnalytics,
    Action::ViewComplianceRecords,
    Action::ViewVehicleFinancials,
    Action::ViewOperatingCosts,
    Action::ViewRevenueReports,
    Action::ApproveVehiclePurchases,
    Action::ApproveVehicleSales,
    Action::ManageLeaseAgreements,
    Action::ProcessInsuranceClaims,
    Action::AdjustDriverPayouts,
    Action::ApproveMajorRepairs,
    Action::ManageFuelCards,
];

const DRIVER: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::UpdateVehicleStatus,
    Action::ViewMaintenanceSchedule,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
];

const OPERATOR: &[Action] = &[
    Action::ViewVehiclesBasic,
    Action::ViewVehicleLocation,
    Action::ViewVehicleStatus,
    Action::UpdateVehicleStatus,
    Action::AssignDriver,
    Action::ViewMaintenanceSchedule,
    Action::ScheduleMaintenance,
    Action::ViewVehicleDocuments,
    Action::ReportVehicleIssue,
    Action::ViewTripHistory,
    Action::ViewVehiclesDetailed,
    Action::ViewDriverAssignments,
    Action::ViewOperatingCosts,
];

impl RoleCapabilities for Role {
    fn allowed_actions(&self) -> &'static [Action] {
        match self {
            Role::GroundOps => GROUND_OPS,
            Role::OpsManager => OPS_MANAGER,
            Role::RegionalManager => REGIONAL_MANAGER,
            Role::Executive => Action::ALL,
            Role::Support => SUPPORT,
            Role::RiskInvestigator => RISK_INVESTIGATOR,
            Role::Analyst => ANALYST,
            Role::FinanceOps => FINANCE_OPS,
            Role::Driver => DRIVER,
            Role::Operator => OPERATOR,
        }
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        match self {
            Role::GroundOps => true,
            Role::OpsManager => true,
            Role::RegionalManager => true,
            Role::Executive => true,
            Role::Support => false,
            Role::RiskInvestigator => false,
            Role::Analyst => false,
            Role::FinanceOps => true,
            Role::Driver => true, // Own vehicle status only
            Role::Operator => true,
        }
    }

    fn can_delete(&self) -> bool {
        matches!(
            self,
            Role::OpsManager | Role::RegionalManager | Role::Executive
        )
    }

    fn is_data_steward(&self) -> bool {
        matches!(
            self,
            Role::OpsManager
                | Role::RegionalManager
                | Role::Executive
                | Role::FinanceOps
                | Role::RiskInvestigator
        )
    }

    fn can_override_region(&self) -> bool {
        matches!(self, Role::Support | Role::RiskInvestigator)
    }

    fn is_top_tier(&self) -> bool {
        matches!(self, Role::Executive)
    }
}
