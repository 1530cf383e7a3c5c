//! # Fleetgate
//!
//! Attribute-based access control for fleet and vehicle data.
//!
//! Fleetgate decides whether a principal may perform an action on a fleet
//! resource, which fields must be masked, whether step-up authentication is
//! required, and which rows a bulk query may touch. Every decision is
//! audited.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    AccessControlService                       │
//! │  ┌──────────────┐   ┌────────────────┐   ┌────────────────┐  │
//! │  │ Ownership    │ → │ PolicyEvaluator│ → │ AuditRecorder  │  │
//! │  │ matrix       │   │ (6 gates+cache)│   │ (queue → sink) │  │
//! │  └──────────────┘   └────────────────┘   └────────────────┘  │
//! │         │                                                     │
//! │         └──────→ AccessPolicy → QueryFilter / row projection  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fleetgate::{AccessControlService, Action, OwnershipType, Principal, ResourceContext, Role};
//! use fleetgate::audit::{InMemoryAuditSink, InlineAuditRecorder};
//!
//! let sink = Arc::new(InMemoryAuditSink::new());
//! let service = AccessControlService::builder()
//!     .with_recorder(Arc::new(InlineAuditRecorder::new(sink.clone())))
//!     .build()?;
//!
//! let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
//! let resource = ResourceContext::new("veh-1", OwnershipType::FleetOwned, "NCR");
//!
//! let decision = service.evaluate(&principal, &resource, Action::ApproveVehiclePurchases);
//! assert!(!decision.allowed);
//! assert_eq!(decision.denial().map(|d| d.error), Some("access_denied".to_string()));
//!
//! service.shutdown(Duration::from_secs(1));
//! # Ok::<(), fleetgate::FleetgateError>(())
//! ```

mod error;
mod service;

pub use error::{FleetgateError, Result};
pub use service::{AccessControlService, ServiceBuilder};

// Re-export the component crates
pub use fleetgate_abac as abac;
pub use fleetgate_audit as audit;
pub use fleetgate_config as config;
pub use fleetgate_rbac as rbac;

// Re-export the request and decision types
pub use fleetgate_rbac::{AccessPolicy, QueryFilter, QueryOperation, WriteDecision};
pub use fleetgate_types::{
    AccessLevel, Action, Condition, ConditionKind, DataClassification, Decision, DenialPayload,
    DenialStep, OwnershipType, PartialResourceContext, PiiScope, Principal, ResourceContext, Role,
};
