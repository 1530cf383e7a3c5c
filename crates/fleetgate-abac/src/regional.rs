//! Regional scope checks.

use fleetgate_rbac::RoleCapabilities;
use fleetgate_types::{Principal, ResourceContext};
use serde::{Deserialize, Serialize};

/// How a principal reached a resource's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionalGrant {
    /// The resource region is listed in the principal's regions.
    Member,
    /// The principal holds the wildcard region.
    Wildcard,
    /// An investigation or support role reached the resource through an
    /// open case.
    CaseOverride,
}

impl RegionalGrant {
    /// Returns whether the cross-region override was used.
    ///
    /// An override always requires step-up authentication.
    pub fn is_override(self) -> bool {
        self == RegionalGrant::CaseOverride
    }
}

/// Decides whether a principal may act in a resource's region.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionalScopeValidator;

impl RegionalScopeValidator {
    /// Returns how the principal reached the region, or `None` if it is out
    /// of scope.
    ///
    /// Direct membership is preferred over the wildcard, and both over the
    /// case override, so an override is only reported when nothing else
    /// applies.
    pub fn validate(principal: &Principal, resource: &ResourceContext) -> Option<RegionalGrant> {
        if !resource.region_id.is_wildcard() && principal.regions.contains(&resource.region_id) {
            return Some(RegionalGrant::Member);
        }
        if principal.has_all_regions() {
            return Some(RegionalGrant::Wildcard);
        }
        if principal.role.can_override_region() && resource.case_id.is_some() {
            return Some(RegionalGrant::CaseOverride);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_types::{OwnershipType, Role};
    use test_case::test_case;

    fn resource(region: &str) -> ResourceContext {
        ResourceContext::new("veh-1", OwnershipType::FleetOwned, region)
    }

    #[test]
    fn test_member_region() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        assert_eq!(
            RegionalScopeValidator::validate(&principal, &resource("NCR")),
            Some(RegionalGrant::Member)
        );
    }

    #[test]
    fn test_wildcard_region() {
        let principal = Principal::new("e1", Role::Executive).with_all_regions();
        assert_eq!(
            RegionalScopeValidator::validate(&principal, &resource("CEB")),
            Some(RegionalGrant::Wildcard)
        );
    }

    #[test]
    fn test_out_of_scope() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        assert_eq!(
            RegionalScopeValidator::validate(&principal, &resource("CEB")),
            None
        );
    }

    #[test]
    fn test_resource_wildcard_region_is_not_membership() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("*");
        assert_eq!(
            RegionalScopeValidator::validate(&principal, &resource("*")),
            Some(RegionalGrant::Wildcard)
        );

        let scoped = Principal::new("g2", Role::GroundOps).with_region("NCR");
        assert_eq!(RegionalScopeValidator::validate(&scoped, &resource("*")), None);
    }

    #[test_case(Role::Support, true; "support")]
    #[test_case(Role::RiskInvestigator, true; "risk investigator")]
    #[test_case(Role::OpsManager, false; "ops manager")]
    #[test_case(Role::Analyst, false; "analyst")]
    fn test_case_override(role: Role, expected: bool) {
        let principal = Principal::new("p1", role).with_region("NCR");
        let with_case = resource("CEB").with_case("C-1");

        let grant = RegionalScopeValidator::validate(&principal, &with_case);
        assert_eq!(grant == Some(RegionalGrant::CaseOverride), expected);
        assert_eq!(grant.is_some(), expected);
    }

    #[test]
    fn test_override_needs_case() {
        let principal = Principal::new("s1", Role::Support).with_region("NCR");
        assert_eq!(
            RegionalScopeValidator::validate(&principal, &resource("CEB")),
            None
        );
    }

    #[test]
    fn test_member_region_wins_over_override() {
        let principal = Principal::new("s1", Role::Support).with_region("CEB");
        let grant = RegionalScopeValidator::validate(&principal, &resource("CEB").with_case("C-1"));
        assert_eq!(grant, Some(RegionalGrant::Member));
        assert!(!grant.is_some_and(RegionalGrant::is_override));
    }
}
