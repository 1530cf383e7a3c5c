//! Audit event type.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetgate_types::{Action, Decision, DenialStep, Principal, PrincipalId, ResourceContext, ResourceId, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of one authorization evaluation.
///
/// Events are immutable once built: fields are private and there are no
/// setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    timestamp: DateTime<Utc>,
    correlation_id: Uuid,
    principal_id: PrincipalId,
    role: Role,
    resource_id: ResourceId,
    action: Action,
    decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<DenialStep>,
    cache_hit: bool,
    latency_us: u64,
}

impl AuditEvent {
    /// Builds an event for an evaluation that just completed.
    ///
    /// A fresh correlation id is generated when the caller supplies none.
    pub fn new(
        principal: &Principal,
        resource: &ResourceContext,
        action: Action,
        decision: &Decision,
        cache_hit: bool,
        latency: Duration,
        correlation_id: Option<Uuid>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
            principal_id: principal.id.clone(),
            role: principal.role,
            resource_id: resource.resource_id.clone(),
            action,
            decision: decision.clone(),
            step: decision.step,
            cache_hit,
            latency_us: u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Snapshot of the decision returned to the caller.
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Failing gate, if the request was denied.
    pub fn step(&self) -> Option<DenialStep> {
        self.step
    }

    /// Whether the decision was served from cache.
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Evaluation latency in microseconds.
    pub fn latency_us(&self) -> u64 {
        self.latency_us
    }
}
