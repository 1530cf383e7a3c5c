//! Policy evaluation engine.
//!
//! Evaluates an access request through six ordered gates. The first failing
//! gate sets the denial step; later gates never run.
//!
//! 1. Base permission (role allow-list)
//! 2. Regional scope
//! 3. Ownership tier
//! 4. Data sensitivity
//! 5. MFA determination
//! 6. Projection assembly (masked fields, conditions)

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use fleetgate_audit::{AuditEvent, AuditRecorder};
use fleetgate_rbac::masking::masked_fields_for;
use fleetgate_rbac::{OwnershipAccessMatrix, RoleCapabilities};
use fleetgate_types::{
    Action, CaseId, Condition, ConditionKind, DataClassification, Decision, DenialStep,
    OwnershipType, PiiScope, Principal, RegionId, ResourceContext, Role,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheConfig, CacheKey, CacheStats, TtlCache};
use crate::regional::RegionalScopeValidator;
use crate::sensitivity::DataSensitivityGate;

/// Default lifetime, in days, of the `time_limited` condition on
/// investigation actions.
pub const DEFAULT_INVESTIGATION_WINDOW_DAYS: i64 = 7;

/// Evaluator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Decision cache timing, or `None` to evaluate every request.
    pub cache: Option<CacheConfig>,
    pub investigation_window: TimeDelta,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cache: Some(CacheConfig::default()),
            investigation_window: TimeDelta::days(DEFAULT_INVESTIGATION_WINDOW_DAYS),
        }
    }
}

/// Attributes a decision depends on.
///
/// Excludes `resource_id`: resources with identical attributes share an
/// entry. The case id is included because it changes the grant.
#[derive(Serialize)]
struct DecisionKey<'a> {
    principal_id: &'a str,
    role: Role,
    regions: &'a BTreeSet<RegionId>,
    pii_scope: PiiScope,
    action: Action,
    resource_region: &'a RegionId,
    ownership_type: OwnershipType,
    data_classification: DataClassification,
    contains_pii: bool,
    case_id: Option<&'a str>,
}

impl<'a> DecisionKey<'a> {
    fn new(principal: &'a Principal, resource: &'a ResourceContext, action: Action) -> Self {
        Self {
            principal_id: principal.id.as_str(),
            role: principal.role,
            regions: &principal.regions,
            pii_scope: principal.pii_scope,
            action,
            resource_region: &resource.region_id,
            ownership_type: resource.ownership_type,
            data_classification: resource.data_classification,
            contains_pii: resource.contains_pii,
            case_id: resource.case_id.as_ref().map(CaseId::as_str),
        }
    }
}

/// Combines the access gates into a single decision and audits every call.
///
/// `Send + Sync`; share one instance across request handlers.
pub struct PolicyEvaluator {
    matrix: Arc<OwnershipAccessMatrix>,
    recorder: Arc<dyn AuditRecorder>,
    cache: Option<TtlCache<Decision>>,
    investigation_window: TimeDelta,
}

impl std::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("cache", &self.cache)
            .field("investigation_window", &self.investigation_window)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    pub fn new(
        matrix: Arc<OwnershipAccessMatrix>,
        recorder: Arc<dyn AuditRecorder>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            matrix,
            recorder,
            cache: config.cache.map(TtlCache::new),
            investigation_window: config.investigation_window,
        }
    }

    pub fn matrix(&self) -> &OwnershipAccessMatrix {
        &self.matrix
    }

    /// Evaluates a request and emits one audit event.
    pub fn evaluate(&self, principal: &Principal, resource: &ResourceContext, action: Action) -> Decision {
        self.evaluate_correlated(principal, resource, action, None)
    }

    /// Like [`evaluate`](Self::evaluate), threading the caller's request id
    /// into the audit event.
    pub fn evaluate_correlated(
        &self,
        principal: &Principal,
        resource: &ResourceContext,
        action: Action,
        correlation_id: Option<Uuid>,
    ) -> Decision {
        let started = Instant::now();

        let key = self.cache.as_ref().and_then(|_| {
            CacheKey::digest(&DecisionKey::new(principal, resource, action))
                .inspect_err(|e| warn!(error = %e, "Failed to derive decision cache key"))
                .ok()
        });

        let cached = match (&self.cache, &key) {
            (Some(cache), Some(key)) => cache.get_valid(key, Decision::is_consistent),
            _ => None,
        };
        let cache_hit = cached.is_some();

        let decision = match cached {
            Some(decision) => decision,
            None => {
                let decision = self.decide(principal, resource, action);
                // Time-limited grants expire relative to the request that
                // produced them.
                let cacheable = decision.condition(ConditionKind::TimeLimited).is_none();
                if let (Some(cache), Some(key), true) = (&self.cache, key, cacheable) {
                    cache.put(key, decision.clone());
                }
                decision
            }
        };

        let latency = started.elapsed();
        log_decision(principal, resource, action, &decision, cache_hit, latency);
        self.recorder.record(AuditEvent::new(
            principal,
            resource,
            action,
            &decision,
            cache_hit,
            latency,
            correlation_id,
        ));

        decision
    }

    /// Runs the gates without touching the cache or the audit trail.
    pub fn decide(&self, principal: &Principal, resource: &ResourceContext, action: Action) -> Decision {
        let role = principal.role;

        // 1. Base permission
        if !role.permits(action) {
            return Decision::deny(DenialStep::Rbac);
        }

        // 2. Regional scope
        let Some(regional) = RegionalScopeValidator::validate(principal, resource) else {
            return Decision::deny(DenialStep::Regional);
        };

        // 3. Ownership tier
        let Some(tier) = self.matrix.grant(role, resource.ownership_type, action) else {
            return Decision::deny(DenialStep::Ownership);
        };

        // 4. Data sensitivity
        if let Err(violation) = DataSensitivityGate::check(principal, resource) {
            debug!(
                principal = %principal.id,
                resource = %resource.resource_id,
                violation = %violation,
                "Sensitivity gate refused request"
            );
            return Decision::deny(DenialStep::Sensitivity);
        }

        // 5. MFA determination
        let mut decision = Decision::allow(tier.access_level());
        decision.requires_mfa = DataSensitivityGate::requires_mfa(action, resource, regional);

        // 6. Projection assembly
        decision.masked_fields = masked_fields_for(principal.pii_scope, role);

        if action.is_investigation() {
            let Some(expires_at) = Utc::now().checked_add_signed(self.investigation_window) else {
                error!(
                    principal = %principal.id,
                    window_days = self.investigation_window.num_days(),
                    "Investigation window overflows, denying"
                );
                return Decision::deny(DenialStep::Sensitivity);
            };
            let mut condition = Condition::time_limited(
                format!(
                    "Investigation access expires after {} days",
                    self.investigation_window.num_days()
                ),
                expires_at,
            );
            if let Some(case_id) = &resource.case_id {
                condition = condition.with_metadata("case_id", case_id.as_str());
            }
            decision.conditions.push(condition);
        }

        if action.is_major_financial() && !role.is_top_tier() {
            decision.conditions.push(
                Condition::supervisor_approval("Major financial action requires supervisor approval")
                    .with_metadata("action", action.as_str()),
            );
        }

        decision
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(TtlCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

fn log_decision(
    principal: &Principal,
    resource: &ResourceContext,
    action: Action,
    decision: &Decision,
    cache_hit: bool,
    latency: Duration,
) {
    let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
    if decision.allowed {
        debug!(
            principal = %principal.id,
            role = %principal.role,
            resource = %resource.resource_id,
            action = %action,
            access_level = %decision.access_level,
            requires_mfa = decision.requires_mfa,
            cache_hit,
            latency_us,
            "Access granted"
        );
    } else {
        info!(
            principal = %principal.id,
            role = %principal.role,
            resource = %resource.resource_id,
            action = %action,
            step = ?decision.step,
            cache_hit,
            latency_us,
            "Access denied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_audit::{InMemoryAuditSink, InlineAuditRecorder};
    use fleetgate_types::{AccessLevel, ConditionKind};

    fn evaluator(config: EvaluatorConfig) -> (PolicyEvaluator, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = Arc::new(InlineAuditRecorder::new(sink.clone()));
        let matrix = Arc::new(OwnershipAccessMatrix::default_matrix().unwrap());
        (PolicyEvaluator::new(matrix, recorder, config), sink)
    }

    fn fleet_resource(region: &str) -> ResourceContext {
        ResourceContext::new("veh-1", OwnershipType::FleetOwned, region)
    }

    #[test]
    fn test_rbac_gate_runs_first() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        // Out of region as well, but the allow-list is checked first.
        let principal = Principal::new("d1", Role::Driver).with_region("NCR");
        let decision = evaluator.decide(&principal, &fleet_resource("CEB"), Action::DecommissionVehicle);

        assert!(!decision.allowed);
        assert_eq!(decision.step, Some(DenialStep::Rbac));
    }

    #[test]
    fn test_sensitivity_gate() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let decision = evaluator.decide(
            &principal,
            &fleet_resource("NCR").with_pii(),
            Action::ViewVehiclesBasic,
        );
        assert_eq!(decision.step, Some(DenialStep::Sensitivity));
        assert!(decision.is_consistent());
    }

    #[test]
    fn test_case_override_requires_mfa() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("r1", Role::RiskInvestigator)
            .with_region("NCR")
            .with_pii_scope(PiiScope::Full);
        let resource = fleet_resource("CEB").with_case("C-9");

        let decision = evaluator.decide(&principal, &resource, Action::ViewVehiclesBasic);
        assert!(decision.allowed);
        assert!(decision.requires_mfa);
        assert_eq!(decision.access_level, AccessLevel::Basic);
    }

    #[test]
    fn test_major_financial_below_top_tier_needs_supervisor() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("f1", Role::FinanceOps).with_region("NCR");
        let decision = evaluator.decide(&principal, &fleet_resource("NCR"), Action::ApproveMajorRepairs);

        assert!(decision.allowed);
        assert_eq!(decision.access_level, AccessLevel::Financial);
        let condition = decision.condition(ConditionKind::SupervisorApproval).unwrap();
        assert_eq!(
            condition.metadata.as_ref().and_then(|m| m.get("action")).map(String::as_str),
            Some("approve_major_repairs")
        );
        // Not financial-critical, internal data, member region.
        assert!(!decision.requires_mfa);
    }

    #[test]
    fn test_executive_skips_supervisor_approval() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("e1", Role::Executive).with_all_regions();
        let decision = evaluator.decide(&principal, &fleet_resource("NCR"), Action::ApproveVehicleSales);

        assert!(decision.allowed);
        assert!(decision.requires_mfa);
        assert!(decision.condition(ConditionKind::SupervisorApproval).is_none());
    }

    #[test]
    fn test_masked_fields_for_support() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("s1", Role::Support)
            .with_region("NCR")
            .with_pii_scope(PiiScope::Masked);
        let decision = evaluator.decide(&principal, &fleet_resource("NCR"), Action::ViewVehiclesBasic);

        assert!(decision.allowed);
        assert!(decision.masked_fields.contains("driver_phone"));
        assert!(decision.masked_fields.contains("purchase_price"));
        assert!(decision.masked_fields.contains("vin"));
    }

    #[test]
    fn test_cache_hit_still_audited() {
        let (evaluator, sink) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let resource = fleet_resource("NCR");

        let first = evaluator.evaluate(&principal, &resource, Action::ViewVehiclesBasic);
        let second = evaluator.evaluate(&principal, &resource, Action::ViewVehiclesBasic);
        assert_eq!(first, second);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(!events[0].cache_hit());
        assert!(events[1].cache_hit());

        let stats = evaluator.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cache_key_distinguishes_case() {
        let (evaluator, _) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("s1", Role::Support)
            .with_region("NCR")
            .with_pii_scope(PiiScope::Masked);

        let without_case = fleet_resource("CEB");
        let with_case = fleet_resource("CEB").with_case("C-1");

        assert!(!evaluator.evaluate(&principal, &without_case, Action::ViewVehiclesBasic).allowed);
        assert!(evaluator.evaluate(&principal, &with_case, Action::ViewVehiclesBasic).allowed);
    }

    #[test]
    fn test_disabled_cache() {
        let (evaluator, sink) = evaluator(EvaluatorConfig {
            cache: None,
            ..EvaluatorConfig::default()
        });
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");

        evaluator.evaluate(&principal, &fleet_resource("NCR"), Action::ViewVehiclesBasic);
        evaluator.evaluate(&principal, &fleet_resource("NCR"), Action::ViewVehiclesBasic);

        assert!(evaluator.cache_stats().is_none());
        assert!(sink.events().iter().all(|e| !e.cache_hit()));
    }

    #[test]
    fn test_correlation_id_reaches_audit() {
        let (evaluator, sink) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let correlation = Uuid::new_v4();

        evaluator.evaluate_correlated(
            &principal,
            &fleet_resource("NCR"),
            Action::ViewVehiclesBasic,
            Some(correlation),
        );
        assert_eq!(sink.events()[0].correlation_id(), correlation);
    }

    #[test]
    fn test_custom_investigation_window() {
        let (evaluator, _) = evaluator(EvaluatorConfig {
            investigation_window: TimeDelta::days(2),
            ..EvaluatorConfig::default()
        });
        let principal = Principal::new("r1", Role::RiskInvestigator)
            .with_all_regions()
            .with_pii_scope(PiiScope::Full);
        let resource = ResourceContext::new("veh-1", OwnershipType::PlatformOwned, "NCR");

        let before = Utc::now();
        let decision = evaluator.decide(&principal, &resource, Action::AccessIncidentEvidence);
        let expires = decision
            .condition(ConditionKind::TimeLimited)
            .and_then(|c| c.expires_at)
            .unwrap();

        assert!(expires >= before + TimeDelta::days(2));
        assert!(expires <= Utc::now() + TimeDelta::days(2));
    }

    #[test]
    fn test_unrepresentable_investigation_window_fails_closed() {
        let (evaluator, _) = evaluator(EvaluatorConfig {
            investigation_window: TimeDelta::days(u32::MAX.into()),
            ..EvaluatorConfig::default()
        });
        let principal = Principal::new("r1", Role::RiskInvestigator)
            .with_all_regions()
            .with_pii_scope(PiiScope::Full);
        let resource = ResourceContext::new("veh-1", OwnershipType::PlatformOwned, "NCR");

        let decision = evaluator.evaluate(&principal, &resource, Action::InvestigateVehicleIncidents);
        assert!(!decision.allowed);
        assert!(decision.is_consistent());

        // Actions without a time limit are unaffected.
        assert!(evaluator.evaluate(&principal, &resource, Action::ViewVehiclesBasic).allowed);
    }

    #[test]
    fn test_investigation_grants_are_per_case() {
        let (evaluator, sink) = evaluator(EvaluatorConfig::default());
        let principal = Principal::new("r1", Role::RiskInvestigator)
            .with_region("NCR")
            .with_pii_scope(PiiScope::Full);
        let first = ResourceContext::new("veh-1", OwnershipType::FleetOwned, "CEB").with_case("C-1");
        let second = ResourceContext::new("veh-2", OwnershipType::FleetOwned, "CEB").with_case("C-2");

        let case_of = |decision: &Decision| {
            decision
                .condition(ConditionKind::TimeLimited)
                .and_then(|c| c.metadata.as_ref())
                .and_then(|m| m.get("case_id"))
                .cloned()
        };

        let a = evaluator.evaluate(&principal, &first, Action::InvestigateVehicleIncidents);
        let b = evaluator.evaluate(&principal, &second, Action::InvestigateVehicleIncidents);
        let c = evaluator.evaluate(&principal, &first, Action::InvestigateVehicleIncidents);

        assert!(a.allowed && b.allowed && c.allowed);
        assert_eq!(case_of(&a).as_deref(), Some("C-1"));
        assert_eq!(case_of(&b).as_deref(), Some("C-2"));
        assert_eq!(case_of(&c).as_deref(), Some("C-1"));

        // Time-limited grants are re-stamped on every request.
        assert!(sink.events().iter().all(|e| !e.cache_hit()));
        assert_eq!(evaluator.cache_stats().unwrap().entries, 0);
    }
}
