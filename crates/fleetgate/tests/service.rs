//! End-to-end tests through `AccessControlService`.

use std::sync::Arc;
use std::time::Duration;

use fleetgate::audit::{InMemoryAuditSink, InlineAuditRecorder};
use fleetgate::config::{AuditSinkKind, FleetgateConfig};
use fleetgate::{
    AccessControlService, AccessLevel, Action, ConditionKind, DataClassification, DenialStep,
    OwnershipType, PartialResourceContext, PiiScope, Principal, QueryOperation, ResourceContext,
    Role,
};
use serde_json::{Map, Value, json};
use tempfile::tempdir;
use uuid::Uuid;

fn service() -> (AccessControlService, Arc<InMemoryAuditSink>) {
    let sink = Arc::new(InMemoryAuditSink::new());
    let service = AccessControlService::builder()
        .with_recorder(Arc::new(InlineAuditRecorder::new(sink.clone())))
        .build()
        .expect("service should build with defaults");
    (service, sink)
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().expect("object literal").clone()
}

#[test]
fn test_decisions_are_audited_with_correlation_id() {
    let (service, sink) = service();
    let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
    let resource = ResourceContext::new("veh-1", OwnershipType::FleetOwned, "NCR")
        .with_classification(DataClassification::Internal);
    let request_id = Uuid::new_v4();

    let granted = service.evaluate_correlated(&principal, &resource, Action::ViewVehiclesBasic, request_id);
    let denied = service.evaluate(&principal, &resource, Action::ApproveVehiclePurchases);

    assert!(granted.allowed);
    assert_eq!(granted.access_level, AccessLevel::Basic);
    assert!(!denied.allowed);
    assert_eq!(denied.step, Some(DenialStep::Ownership));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].correlation_id(), request_id);
    assert_eq!(events[1].step(), Some(DenialStep::Ownership));
}

#[test]
fn test_repeated_request_served_from_cache() {
    let (service, sink) = service();
    let principal = Principal::new("o1", Role::OpsManager)
        .with_region("NCR")
        .with_pii_scope(PiiScope::Masked);
    let resource = ResourceContext::new("veh-2", OwnershipType::FleetOwned, "NCR").with_pii();

    let first = service.evaluate(&principal, &resource, Action::ViewVehiclesBasic);
    let second = service.evaluate(&principal, &resource, Action::ViewVehiclesBasic);

    assert_eq!(first, second);
    let stats = service.decision_cache_stats().expect("cache enabled by default");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    let events = sink.events();
    assert!(!events[0].cache_hit());
    assert!(events[1].cache_hit());
}

#[test]
fn test_investigation_carries_time_limit() {
    let (service, _) = service();
    let principal = Principal::new("e1", Role::Executive)
        .with_all_regions()
        .with_pii_scope(PiiScope::Full);
    let resource = ResourceContext::new("veh-7", OwnershipType::DriverOwned, "CEB")
        .with_classification(DataClassification::Restricted)
        .with_pii()
        .with_case("C-1");

    let decision = service.evaluate(&principal, &resource, Action::InvestigateVehicleIncidents);

    assert!(decision.allowed);
    assert!(decision.requires_mfa);
    assert!(decision.condition(ConditionKind::TimeLimited).is_some());
}

#[test]
fn test_bulk_read_filters_and_projects_rows() {
    let (service, _) = service();
    let principal = Principal::new("s1", Role::Support)
        .with_region("NCR")
        .with_pii_scope(PiiScope::Masked);
    let context = PartialResourceContext::new();

    let filter = service.build_query_filter(&principal, QueryOperation::Read, &context);
    assert!(!filter.is_deny_all());

    let rows = vec![
        object(json!({
            "vehicle_id": "veh-1",
            "region_id": "NCR",
            "ownership_type": "fleet_owned",
            "data_classification": "internal",
            "driver_name": "Ana Cruz",
        })),
        object(json!({
            "vehicle_id": "veh-2",
            "region_id": "CEB",
            "ownership_type": "fleet_owned",
            "data_classification": "internal",
            "driver_name": "Ben Reyes",
        })),
    ];
    let visible: Vec<_> = rows.into_iter().filter(|row| filter.matches(row)).collect();
    assert_eq!(visible.len(), 1);

    let policy = service.get_access_policy(&principal, &context);
    let projected = service.filter_results(&visible, &policy);
    assert_eq!(projected[0]["vehicle_id"], json!("veh-1"));
    assert_eq!(projected[0]["driver_name"], json!("An****uz"));
}

#[test]
fn test_filter_denies_all_for_unpermitted_operation() {
    let (service, _) = service();
    let principal = Principal::new("a1", Role::Analyst).with_region("NCR");

    let filter =
        service.build_query_filter(&principal, QueryOperation::Delete, &PartialResourceContext::new());

    assert!(filter.is_deny_all());
}

#[test]
fn test_write_validation() {
    let (service, _) = service();
    let ground_ops = Principal::new("g1", Role::GroundOps).with_region("NCR");

    let create = object(json!({
        "region_id": "NCR",
        "ownership_type": "fleet_owned",
        "data_classification": "internal",
    }));
    let decision = service.validate_write(&ground_ops, &create, QueryOperation::Create);
    assert!(decision.allowed);
    assert!(!decision.requires_mfa);

    let out_of_region = object(json!({
        "region_id": "CEB",
        "ownership_type": "fleet_owned",
    }));
    let decision = service.validate_write(&ground_ops, &out_of_region, QueryOperation::Create);
    assert!(!decision.allowed);
    assert_eq!(decision.step, Some(DenialStep::ExpansionScope));
    assert_eq!(
        decision.denial().map(|d| d.error),
        Some("access_denied".to_string())
    );

    let manager = Principal::new("o1", Role::OpsManager).with_region("NCR");
    let delete = object(json!({ "region_id": "NCR" }));
    let decision = service.validate_write(&manager, &delete, QueryOperation::Delete);
    assert!(decision.allowed);
    assert!(decision.requires_mfa);
    assert!(
        decision
            .conditions
            .iter()
            .any(|c| c.kind == ConditionKind::SupervisorApproval)
    );
}

#[test]
fn test_from_config_writes_json_lines_audit_log() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("audit").join("events.jsonl");

    let mut config = FleetgateConfig::default();
    config.audit.sink = AuditSinkKind::JsonLines;
    config.audit.log_file = log_file.clone();

    let service = AccessControlService::from_config(&config).expect("service should start");
    let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
    let resource = ResourceContext::new("veh-1", OwnershipType::FleetOwned, "NCR");
    service.evaluate(&principal, &resource, Action::ViewVehiclesBasic);
    service.evaluate(&principal, &resource, Action::ApproveVehiclePurchases);

    assert!(service.shutdown(Duration::from_secs(5)));
    assert_eq!(service.audit_stats().delivered, 2);

    let contents = std::fs::read_to_string(&log_file).expect("audit log should exist");
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is one JSON event"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["principal_id"], json!("g1"));
    assert_eq!(lines[0]["action"], json!("view_vehicles_basic"));
    assert_eq!(lines[1]["step"], json!("ownership"));
}
