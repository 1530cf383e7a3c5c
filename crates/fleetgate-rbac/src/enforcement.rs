//! Row-level security and write validation.
//!
//! Turns an [`AccessPolicy`] into an engine-agnostic filter for bulk reads and
//! writes. The filter is a predicate tree over named parameters; no query
//! text is ever produced, so nothing from a principal or payload is
//! interpolated into a query language.
//!
//! ```text
//! AND(
//!   region_id IN :allowed_regions,
//!   ownership_type IN :allowed_ownership_types,
//!   data_classification IN :allowed_data_classes,
//!   deleted_at IS NULL,
//!   assigned_driver_id = :principal_id      -- drivers only
//! )
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use fleetgate_types::{
    Condition, DataClassification, DenialPayload, DenialStep, OwnershipType, PartialResourceContext,
    Principal, RegionId, Role,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::matrix::OwnershipAccessMatrix;
use crate::policy::{AccessPolicy, FieldRestrictions, get_access_policy};
use crate::roles::RoleCapabilities;

/// Column holding a record's region.
pub const REGION_FIELD: &str = "region_id";
/// Column holding a record's ownership type.
pub const OWNERSHIP_FIELD: &str = "ownership_type";
/// Column holding a record's data classification.
pub const CLASSIFICATION_FIELD: &str = "data_classification";
/// Soft-delete marker column.
pub const DELETED_AT_FIELD: &str = "deleted_at";
/// Driver assignment column.
pub const ASSIGNED_DRIVER_FIELD: &str = "assigned_driver_id";
/// Operator assignment column.
pub const OPERATOR_FIELD: &str = "operator_id";

const REGIONS_PARAM: &str = "allowed_regions";
const OWNERSHIP_PARAM: &str = "allowed_ownership_types";
const CLASSES_PARAM: &str = "allowed_data_classes";
const PRINCIPAL_PARAM: &str = "principal_id";

// ============================================================================
// Filter types
// ============================================================================

/// Bulk operation a filter is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperation {
    Read,
    Create,
    Update,
    Delete,
}

impl QueryOperation {
    /// Returns whether the operation modifies data.
    pub fn is_write(self) -> bool {
        !matches!(self, QueryOperation::Read)
    }

    /// Returns whether `policy` permits this operation at all.
    pub fn permitted_by(self, policy: &AccessPolicy) -> bool {
        match self {
            QueryOperation::Read => policy.can_read,
            QueryOperation::Create | QueryOperation::Update => policy.can_write,
            QueryOperation::Delete => policy.can_delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryOperation::Read => "read",
            QueryOperation::Create => "create",
            QueryOperation::Update => "update",
            QueryOperation::Delete => "delete",
        }
    }
}

impl Display for QueryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryOperation {
    type Err = fleetgate_types::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(QueryOperation::Read),
            "create" => Ok(QueryOperation::Create),
            "update" => Ok(QueryOperation::Update),
            "delete" => Ok(QueryOperation::Delete),
            _ => Err(fleetgate_types::UnknownVariant {
                kind: "QueryOperation",
                value: s.to_string(),
            }),
        }
    }
}

/// Row predicate. Field names are columns; values are parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Matches every row.
    Always,
    /// Matches no row.
    Never,
    /// Matches rows satisfying every clause.
    And { clauses: Vec<Predicate> },
    /// `field` is one of the values of list parameter `param`.
    In { field: String, param: String },
    /// `field` equals scalar parameter `param`.
    Eq { field: String, param: String },
    /// `field` is null.
    IsNull { field: String },
}

impl Predicate {
    fn is_in(field: &str, param: &str) -> Self {
        Predicate::In {
            field: field.to_string(),
            param: param.to_string(),
        }
    }

    fn equals(field: &str, param: &str) -> Self {
        Predicate::Eq {
            field: field.to_string(),
            param: param.to_string(),
        }
    }

    /// Evaluates the predicate against a row.
    ///
    /// A missing field never matches `In`/`Eq` and always matches `IsNull`.
    /// A missing parameter never matches.
    pub fn matches(&self, row: &Map<String, Value>, parameters: &BTreeMap<String, ParamValue>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Never => false,
            Predicate::And { clauses } => clauses.iter().all(|c| c.matches(row, parameters)),
            Predicate::In { field, param } => {
                match (row.get(field).and_then(Value::as_str), parameters.get(param)) {
                    (Some(value), Some(ParamValue::TextList(list))) => {
                        list.iter().any(|candidate| candidate == value)
                    }
                    _ => false,
                }
            }
            Predicate::Eq { field, param } => {
                match (row.get(field).and_then(Value::as_str), parameters.get(param)) {
                    (Some(value), Some(ParamValue::Text(expected))) => value == expected,
                    _ => false,
                }
            }
            Predicate::IsNull { field } => row.get(field).is_none_or(Value::is_null),
        }
    }
}

/// Named parameter bound into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    TextList(Vec<String>),
}

/// Engine-agnostic row filter and field manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub operation: QueryOperation,
    pub predicate: Predicate,
    pub parameters: BTreeMap<String, ParamValue>,
    pub field_manifest: FieldRestrictions,
}

impl QueryFilter {
    /// A filter that matches nothing.
    pub fn deny_all(operation: QueryOperation, field_manifest: FieldRestrictions) -> Self {
        Self {
            operation,
            predicate: Predicate::Never,
            parameters: BTreeMap::new(),
            field_manifest,
        }
    }

    /// Returns whether the filter matches no row.
    pub fn is_deny_all(&self) -> bool {
        self.predicate == Predicate::Never
    }

    /// Evaluates the filter against a row.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.predicate.matches(row, &self.parameters)
    }
}

// ============================================================================
// Filter construction
// ============================================================================

fn text_list<T: Display>(items: impl IntoIterator<Item = T>) -> ParamValue {
    ParamValue::TextList(items.into_iter().map(|item| item.to_string()).collect())
}

/// Builds the row filter for `operation` from `policy`.
pub fn filter_from_policy(policy: &AccessPolicy, operation: QueryOperation) -> QueryFilter {
    let manifest = policy.field_restrictions.clone();

    if !operation.permitted_by(policy) || policy.is_empty_scope() {
        info!(
            principal = %policy.principal_id,
            role = %policy.role,
            operation = %operation,
            "Query filter denies all rows"
        );
        return QueryFilter::deny_all(operation, manifest);
    }

    let mut clauses = Vec::new();
    let mut parameters = BTreeMap::new();

    if !policy.has_all_regions() {
        clauses.push(Predicate::is_in(REGION_FIELD, REGIONS_PARAM));
        parameters.insert(
            REGIONS_PARAM.to_string(),
            text_list(policy.allowed_regions.iter()),
        );
    }

    if policy.allowed_ownership_types.len() < OwnershipType::ALL.len() {
        clauses.push(Predicate::is_in(OWNERSHIP_FIELD, OWNERSHIP_PARAM));
        parameters.insert(
            OWNERSHIP_PARAM.to_string(),
            text_list(policy.allowed_ownership_types.iter()),
        );
    }

    if policy.allowed_data_classes.len() < DataClassification::ALL.len() {
        clauses.push(Predicate::is_in(CLASSIFICATION_FIELD, CLASSES_PARAM));
        parameters.insert(
            CLASSES_PARAM.to_string(),
            text_list(policy.allowed_data_classes.iter()),
        );
    }

    clauses.push(Predicate::IsNull {
        field: DELETED_AT_FIELD.to_string(),
    });

    if let Some(field) = assignment_field(policy.role) {
        clauses.push(Predicate::equals(field, PRINCIPAL_PARAM));
        parameters.insert(
            PRINCIPAL_PARAM.to_string(),
            ParamValue::Text(policy.principal_id.to_string()),
        );
    }

    debug!(
        principal = %policy.principal_id,
        operation = %operation,
        clauses = clauses.len(),
        "Query filter built"
    );

    QueryFilter {
        operation,
        predicate: Predicate::And { clauses },
        parameters,
        field_manifest: manifest,
    }
}

/// Derives the policy for `principal` and builds the row filter for
/// `operation`.
pub fn build_query_filter(
    matrix: &OwnershipAccessMatrix,
    principal: &Principal,
    operation: QueryOperation,
    context: &PartialResourceContext,
) -> QueryFilter {
    let policy = get_access_policy(matrix, principal, context);
    filter_from_policy(&policy, operation)
}

/// Column binding a record to its assignee, for roles limited to their own
/// records.
fn assignment_field(role: Role) -> Option<&'static str> {
    match role {
        Role::Driver => Some(ASSIGNED_DRIVER_FIELD),
        Role::Operator => Some(OPERATOR_FIELD),
        _ => None,
    }
}

/// Strips forbidden fields and masks masked fields in every row.
pub fn filter_results(rows: &[Map<String, Value>], policy: &AccessPolicy) -> Vec<Map<String, Value>> {
    let projected = policy.field_restrictions.projector().project_rows(rows);
    debug!(
        principal = %policy.principal_id,
        rows = projected.len(),
        "Results projected"
    );
    projected
}

// ============================================================================
// Write validation
// ============================================================================

/// Outcome of validating a write payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteDecision {
    pub allowed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<DenialStep>,
    /// Payload fields the principal may not touch.
    pub rejected_fields: BTreeSet<String>,
    pub requires_mfa: bool,
    pub audit_required: bool,
    pub conditions: Vec<Condition>,
}

impl WriteDecision {
    fn deny(step: DenialStep) -> Self {
        Self {
            allowed: false,
            reason: step.public_message().to_string(),
            step: Some(step),
            rejected_fields: BTreeSet::new(),
            requires_mfa: false,
            audit_required: true,
            conditions: Vec::new(),
        }
    }

    fn allow(operation: QueryOperation) -> Self {
        Self {
            allowed: true,
            reason: format!("{operation} permitted"),
            step: None,
            rejected_fields: BTreeSet::new(),
            requires_mfa: false,
            audit_required: true,
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
}

/// Reads an enum-valued payload field.
///
/// `Ok(None)` when absent or null; `Err(())` when present but not a known value.
fn payload_enum<T: std::str::FromStr>(payload: &Map<String, Value>, field: &str) -> Result<Option<T>, ()> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|_| ()),
        Some(_) => Err(()),
    }
}

/// Validates a write payload against the principal's policy.
///
/// Checks, in order:
/// 1. the role may perform the operation (`rbac`)
/// 2. the payload's region, ownership type and assignee stay in scope
///    (`expansion_scope`); a create must name region and ownership type
/// 3. the payload's classification is one the principal may see, and no
///    forbidden field is touched (`sensitivity`)
///
/// Allowed deletes, and writes of restricted data, require MFA; deletes by
/// any role below the top tier also carry a supervisor approval condition.
pub fn validate_write(
    matrix: &OwnershipAccessMatrix,
    principal: &Principal,
    payload: &Map<String, Value>,
    operation: QueryOperation,
) -> WriteDecision {
    let policy = get_access_policy(matrix, principal, &PartialResourceContext::new());
    let decision = check_write(&policy, payload, operation);

    if decision.allowed {
        debug!(principal = %principal.id, operation = %operation, "Write permitted");
    } else {
        info!(
            principal = %principal.id,
            role = %principal.role,
            operation = %operation,
            step = ?decision.step,
            rejected = ?decision.rejected_fields,
            "Write denied"
        );
    }
    decision
}

fn check_write(
    policy: &AccessPolicy,
    payload: &Map<String, Value>,
    operation: QueryOperation,
) -> WriteDecision {
    if !operation.is_write() || !operation.permitted_by(policy) {
        return WriteDecision::deny(DenialStep::Rbac);
    }

    // Region
    let region = match payload.get(REGION_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(RegionId::new(s.clone())),
        Some(_) => return WriteDecision::deny(DenialStep::ExpansionScope),
    };
    match &region {
        Some(region) if region.is_wildcard() || !policy.covers_region(region) => {
            return WriteDecision::deny(DenialStep::ExpansionScope);
        }
        None if operation == QueryOperation::Create => {
            return WriteDecision::deny(DenialStep::ExpansionScope);
        }
        _ => {}
    }

    // Ownership
    let Ok(ownership) = payload_enum::<OwnershipType>(payload, OWNERSHIP_FIELD) else {
        return WriteDecision::deny(DenialStep::ExpansionScope);
    };
    match ownership {
        Some(ownership) if !policy.allowed_ownership_types.contains(&ownership) => {
            return WriteDecision::deny(DenialStep::ExpansionScope);
        }
        None if operation == QueryOperation::Create => {
            return WriteDecision::deny(DenialStep::ExpansionScope);
        }
        _ => {}
    }

    // Assignee
    let reassigned = assignment_field(policy.role)
        .and_then(|field| payload.get(field))
        .is_some_and(|value| value.as_str() != Some(policy.principal_id.as_str()));
    if reassigned {
        return WriteDecision::deny(DenialStep::ExpansionScope);
    }

    // Classification
    let Ok(classification) = payload_enum::<DataClassification>(payload, CLASSIFICATION_FIELD)
    else {
        return WriteDecision::deny(DenialStep::Sensitivity);
    };
    if classification.is_some_and(|c| !policy.allowed_data_classes.contains(&c)) {
        return WriteDecision::deny(DenialStep::Sensitivity);
    }

    // Forbidden fields
    let rejected: BTreeSet<String> = payload
        .keys()
        .filter(|k| policy.field_restrictions.forbidden.contains(k.as_str()))
        .cloned()
        .collect();
    if !rejected.is_empty() {
        let mut decision = WriteDecision::deny(DenialStep::Sensitivity);
        decision.rejected_fields = rejected;
        return decision;
    }

    let mut decision = WriteDecision::allow(operation);
    decision.requires_mfa = operation == QueryOperation::Delete
        || classification == Some(DataClassification::Restricted);
    if operation == QueryOperation::Delete && !policy.role.is_top_tier() {
        decision.conditions.push(
            Condition::supervisor_approval("Record deletion requires supervisor co-approval")
                .with_metadata("operation", operation.as_str()),
        );
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_types::{ConditionKind, PiiScope};
    use serde_json::json;

    fn matrix() -> OwnershipAccessMatrix {
        OwnershipAccessMatrix::default_matrix().unwrap()
    }

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_ground_ops_read_filter() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Read,
            &PartialResourceContext::new(),
        );

        assert!(!filter.is_deny_all());
        assert_eq!(
            filter.parameters.get("allowed_regions"),
            Some(&ParamValue::TextList(vec!["NCR".to_string()]))
        );
        assert_eq!(
            filter.parameters.get("allowed_data_classes"),
            Some(&ParamValue::TextList(vec![
                "public".to_string(),
                "internal".to_string()
            ]))
        );
        // Every ownership type is in reach, so no ownership clause.
        assert!(!filter.parameters.contains_key("allowed_ownership_types"));
        assert!(!filter.parameters.contains_key("principal_id"));

        let Predicate::And { clauses } = &filter.predicate else {
            panic!("expected AND predicate");
        };
        assert!(clauses.contains(&Predicate::IsNull {
            field: "deleted_at".to_string()
        }));
    }

    #[test]
    fn test_executive_filter_has_no_scope_clauses() {
        let principal = Principal::new("e1", Role::Executive)
            .with_all_regions()
            .with_pii_scope(PiiScope::Full);
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Delete,
            &PartialResourceContext::new(),
        );

        assert_eq!(
            filter.predicate,
            Predicate::And {
                clauses: vec![Predicate::IsNull {
                    field: "deleted_at".to_string()
                }]
            }
        );
        assert!(filter.parameters.is_empty());
    }

    #[test]
    fn test_driver_filter_binds_assignment() {
        let principal = Principal::new("drv-7", Role::Driver).with_region("CEB");
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Read,
            &PartialResourceContext::new(),
        );

        assert_eq!(
            filter.parameters.get("principal_id"),
            Some(&ParamValue::Text("drv-7".to_string()))
        );
        assert_eq!(
            filter.parameters.get("allowed_ownership_types"),
            Some(&ParamValue::TextList(vec![
                "fleet_owned".to_string(),
                "driver_owned".to_string()
            ]))
        );

        let own = row(json!({
            "region_id": "CEB",
            "ownership_type": "driver_owned",
            "data_classification": "internal",
            "assigned_driver_id": "drv-7",
        }));
        let other = row(json!({
            "region_id": "CEB",
            "ownership_type": "driver_owned",
            "data_classification": "internal",
            "assigned_driver_id": "drv-8",
        }));
        assert!(filter.matches(&own));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_operator_filter_binds_operator_id() {
        let principal = Principal::new("op-1", Role::Operator).with_region("NCR");
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Update,
            &PartialResourceContext::new(),
        );
        let Predicate::And { clauses } = &filter.predicate else {
            panic!("expected AND predicate");
        };
        assert!(clauses.contains(&Predicate::Eq {
            field: "operator_id".to_string(),
            param: "principal_id".to_string(),
        }));
    }

    #[test]
    fn test_unpermitted_operation_yields_never() {
        let principal = Principal::new("a1", Role::Analyst).with_region("NCR");
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Delete,
            &PartialResourceContext::new(),
        );
        assert!(filter.is_deny_all());
        assert!(filter.parameters.is_empty());
    }

    #[test]
    fn test_empty_scope_yields_never() {
        let principal = Principal::new("s1", Role::Support).with_region("NCR");
        let context = PartialResourceContext::new().with_region("CEB");
        let filter = build_query_filter(&matrix(), &principal, QueryOperation::Read, &context);
        assert!(filter.is_deny_all());
    }

    #[test]
    fn test_filter_excludes_soft_deleted_rows() {
        let principal = Principal::new("e1", Role::Executive)
            .with_all_regions()
            .with_pii_scope(PiiScope::Full);
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Read,
            &PartialResourceContext::new(),
        );
        assert!(filter.matches(&row(json!({"deleted_at": null}))));
        assert!(!filter.matches(&row(json!({"deleted_at": "2026-01-01T00:00:00Z"}))));
    }

    #[test]
    fn test_filter_serializes_as_tagged_tree() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let filter = build_query_filter(
            &matrix(),
            &principal,
            QueryOperation::Read,
            &PartialResourceContext::new(),
        );
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["predicate"]["op"], "and");
        assert_eq!(json["predicate"]["clauses"][0]["op"], "in");
        assert_eq!(json["parameters"]["allowed_regions"], json!(["NCR"]));
        assert_eq!(json["operation"], "read");
    }

    #[test]
    fn test_filter_results() {
        let principal = Principal::new("s1", Role::Support)
            .with_region("NCR")
            .with_pii_scope(PiiScope::Masked);
        let policy = get_access_policy(&matrix(), &principal, &PartialResourceContext::new());

        let rows = vec![row(json!({
            "vehicle_id": "veh-1",
            "driver_name": "Ana Cruz",
            "license_plate": "NBC 1234",
        }))];
        let filtered = filter_results(&rows, &policy);

        assert_eq!(filtered[0]["vehicle_id"], json!("veh-1"));
        assert_eq!(filtered[0]["driver_name"], json!("An****uz"));
        assert_eq!(filtered[0]["license_plate"], json!("NB****34"));
    }

    #[test]
    fn test_filter_results_strips_forbidden() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let policy = get_access_policy(&matrix(), &principal, &PartialResourceContext::new());

        let rows = vec![row(json!({"vehicle_id": "veh-1", "home_address": "12 Mabini St"}))];
        let filtered = filter_results(&rows, &policy);
        assert!(!filtered[0].contains_key("home_address"));
    }

    #[test]
    fn test_validate_write_allows_in_scope_create() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let payload = row(json!({
            "region_id": "NCR",
            "ownership_type": "fleet_owned",
            "data_classification": "internal",
            "status": "available",
        }));

        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert!(decision.allowed);
        assert!(!decision.requires_mfa);
        assert!(decision.denial().is_none());
    }

    #[test]
    fn test_validate_write_rejects_read_and_unpermitted() {
        let principal = Principal::new("a1", Role::Analyst).with_region("NCR");
        let payload = row(json!({"region_id": "NCR"}));

        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Update);
        assert_eq!(decision.step, Some(DenialStep::Rbac));

        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Read);
        assert_eq!(decision.step, Some(DenialStep::Rbac));
    }

    #[test]
    fn test_validate_write_region_expansion() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let payload = row(json!({"region_id": "CEB", "ownership_type": "fleet_owned"}));

        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert!(!decision.allowed);
        let denial = decision.denial().unwrap();
        assert_eq!(denial.error, "access_denied");
        assert_eq!(denial.step, DenialStep::ExpansionScope);
    }

    #[test]
    fn test_validate_write_wildcard_region_is_expansion() {
        let principal = Principal::new("e1", Role::Executive).with_all_regions();
        let payload = row(json!({"region_id": "*", "ownership_type": "fleet_owned"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));
    }

    #[test]
    fn test_validate_write_create_requires_region_and_ownership() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");

        let payload = row(json!({"ownership_type": "fleet_owned"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));

        let payload = row(json!({"region_id": "NCR"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));

        // Updates may leave them unchanged.
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Update);
        assert!(decision.allowed);
    }

    #[test]
    fn test_validate_write_ownership_expansion() {
        let principal = Principal::new("op-1", Role::Operator).with_region("NCR");
        let payload = row(json!({
            "region_id": "NCR",
            "ownership_type": "platform_owned",
            "operator_id": "op-1",
        }));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));
    }

    #[test]
    fn test_validate_write_unknown_ownership_fails_closed() {
        let principal = Principal::new("e1", Role::Executive).with_all_regions();
        let payload = row(json!({"region_id": "NCR", "ownership_type": "leased"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Create);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));
    }

    #[test]
    fn test_validate_write_reassigning_driver_is_expansion() {
        let principal = Principal::new("drv-7", Role::Driver).with_region("CEB");
        let payload = row(json!({"assigned_driver_id": "drv-8"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Update);
        assert_eq!(decision.step, Some(DenialStep::ExpansionScope));
    }

    #[test]
    fn test_validate_write_classification_out_of_reach() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let payload = row(json!({"region_id": "NCR", "data_classification": "confidential"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Update);
        assert_eq!(decision.step, Some(DenialStep::Sensitivity));
    }

    #[test]
    fn test_validate_write_forbidden_field() {
        let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
        let payload = row(json!({"region_id": "NCR", "purchase_price": 1_000_000}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Update);

        assert_eq!(decision.step, Some(DenialStep::Sensitivity));
        assert_eq!(
            decision.rejected_fields,
            BTreeSet::from(["purchase_price".to_string()])
        );
    }

    #[test]
    fn test_validate_delete_requires_mfa_and_supervisor() {
        let principal = Principal::new("m1", Role::OpsManager).with_region("NCR");
        let payload = row(json!({"region_id": "NCR"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Delete);

        assert!(decision.allowed);
        assert!(decision.requires_mfa);
        assert_eq!(decision.conditions.len(), 1);
        assert_eq!(decision.conditions[0].kind, ConditionKind::SupervisorApproval);
    }

    #[test]
    fn test_validate_delete_by_executive_has_no_supervisor() {
        let principal = Principal::new("e1", Role::Executive).with_all_regions();
        let payload = row(json!({"region_id": "NCR"}));
        let decision = validate_write(&matrix(), &principal, &payload, QueryOperation::Delete);

        assert!(decision.allowed);
        assert!(decision.requires_mfa);
        assert!(decision.conditions.is_empty());
    }

    #[test]
    fn test_query_operation_parse() {
        assert_eq!("update".parse::<QueryOperation>().unwrap(), QueryOperation::Update);
        assert!("merge".parse::<QueryOperation>().is_err());
    }
}
