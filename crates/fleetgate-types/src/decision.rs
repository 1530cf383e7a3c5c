//! Evaluation output types.
//!
//! A [`Decision`] is the structured result of one authorization evaluation.
//! Denials are ordinary values, never errors: callers branch on
//! [`Decision::allowed`] and cannot fail open by mishandling an `Err`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Access level & denial step
// ============================================================================

/// Depth of access granted by a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    Basic,
    Detailed,
    Financial,
    Full,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Basic => "basic",
            AccessLevel::Detailed => "detailed",
            AccessLevel::Financial => "financial",
            AccessLevel::Full => "full",
        }
    }
}

impl Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gate that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialStep {
    /// Action is not in the role's allow-list.
    Rbac,
    /// Resource region is outside the principal's scope.
    Regional,
    /// Role lacks the ownership tier holding the action.
    Ownership,
    /// PII scope or classification requirements not met.
    Sensitivity,
    /// A write would move data outside the principal's region or ownership scope.
    ExpansionScope,
}

impl DenialStep {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialStep::Rbac => "rbac",
            DenialStep::Regional => "regional",
            DenialStep::Ownership => "ownership",
            DenialStep::Sensitivity => "sensitivity",
            DenialStep::ExpansionScope => "expansion_scope",
        }
    }

    /// Human-readable explanation that reveals nothing about the policy tables.
    pub fn public_message(self) -> &'static str {
        match self {
            DenialStep::Rbac => "Your role is not permitted to perform this action",
            DenialStep::Regional => "The resource is outside your regional scope",
            DenialStep::Ownership => "Insufficient privilege for this resource's ownership tier",
            DenialStep::Sensitivity => "Data sensitivity requirements are not met",
            DenialStep::ExpansionScope => "The change would place data outside your scope",
        }
    }
}

impl Display for DenialStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Kind of obligation attached to an allowed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// The grant expires at `expires_at`.
    TimeLimited,
    /// A supervisor must co-approve before the action takes effect.
    SupervisorApproval,
}

/// An obligation the caller must honor when acting on an allowed decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Condition {
    /// A grant that lapses at `expires_at`.
    pub fn time_limited(description: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            kind: ConditionKind::TimeLimited,
            description: description.into(),
            expires_at: Some(expires_at),
            metadata: None,
        }
    }

    /// A grant that needs supervisor co-approval.
    pub fn supervisor_approval(description: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::SupervisorApproval,
            description: description.into(),
            expires_at: None,
            metadata: None,
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Result of evaluating one (principal, resource, action) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    /// Failing gate when denied; `None` when allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<DenialStep>,
    pub masked_fields: BTreeSet<String>,
    pub requires_mfa: bool,
    pub audit_required: bool,
    pub access_level: AccessLevel,
    pub conditions: Vec<Condition>,
}

impl Decision {
    /// Creates a denial for the given gate.
    ///
    /// Denials carry no masked fields, conditions, or access level.
    pub fn deny(step: DenialStep) -> Self {
        Self {
            allowed: false,
            reason: step.public_message().to_string(),
            step: Some(step),
            masked_fields: BTreeSet::new(),
            requires_mfa: false,
            audit_required: true,
            access_level: AccessLevel::None,
            conditions: Vec::new(),
        }
    }

    /// Creates a grant at the given access level.
    pub fn allow(access_level: AccessLevel) -> Self {
        debug_assert!(
            access_level != AccessLevel::None,
            "an allowed decision must grant some access"
        );
        Self {
            allowed: true,
            reason: format!("Access granted at {access_level} level"),
            step: None,
            masked_fields: BTreeSet::new(),
            requires_mfa: false,
            audit_required: true,
            access_level,
            conditions: Vec::new(),
        }
    }

    /// Returns the boundary payload for a denial, or `None` when allowed.
    pub fn denial(&self) -> Option<DenialPayload> {
        if self.allowed {
            return None;
        }
        let step = self.step?;
        Some(DenialPayload {
            error: DenialPayload::ERROR_CODE.to_string(),
            message: step.public_message().to_string(),
            step,
        })
    }

    /// Returns whether the decision satisfies the structural invariants.
    ///
    /// - denied ⇒ no masked fields, no conditions, no MFA, level `none`, step set
    /// - allowed ⇒ level above `none`, no step
    /// - audit always required
    pub fn is_consistent(&self) -> bool {
        if !self.audit_required {
            return false;
        }
        if self.allowed {
            self.access_level != AccessLevel::None && self.step.is_none()
        } else {
            self.masked_fields.is_empty()
                && self.conditions.is_empty()
                && !self.requires_mfa
                && self.access_level == AccessLevel::None
                && self.step.is_some()
        }
    }

    /// Returns the first condition of the given kind.
    pub fn condition(&self, kind: ConditionKind) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }
}

/// Machine-readable denial returned across the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialPayload {
    pub error: String,
    pub message: String,
    pub step: DenialStep,
}

impl DenialPayload {
    pub const ERROR_CODE: &'static str = "access_denied";
}
