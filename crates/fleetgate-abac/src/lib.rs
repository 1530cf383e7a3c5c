//! # fleetgate-abac: Attribute-based access decisions
//!
//! Combines role allow-lists, regional scope, the ownership matrix and data
//! sensitivity into a single [`Decision`](fleetgate_types::Decision) per
//! request. Decisions are cached by a canonical digest of their inputs and
//! every evaluation, cached or not, emits one audit event.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Principal + ResourceContext + Action        │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyEvaluator                             │
//! │  ├─ DecisionCache (TTL, BLAKE3 keys)         │
//! │  ├─ rbac → regional → ownership → sensitivity│
//! │  └─ MFA + masked fields + conditions         │
//! └───────┬──────────────────────┬──────────────┘
//!         │                      │ record
//!         ▼                      ▼
//! ┌────────────────┐   ┌───────────────────────┐
//! │ Decision       │   │ AuditRecorder         │
//! └────────────────┘   └───────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use fleetgate_abac::{EvaluatorConfig, PolicyEvaluator};
//! use fleetgate_audit::{InMemoryAuditSink, InlineAuditRecorder};
//! use fleetgate_rbac::OwnershipAccessMatrix;
//! use fleetgate_types::{Action, OwnershipType, Principal, ResourceContext, Role};
//!
//! let sink = Arc::new(InMemoryAuditSink::new());
//! let evaluator = PolicyEvaluator::new(
//!     Arc::new(OwnershipAccessMatrix::default_matrix()?),
//!     Arc::new(InlineAuditRecorder::new(sink.clone())),
//!     EvaluatorConfig::default(),
//! );
//!
//! let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
//! let resource = ResourceContext::new("veh-1", OwnershipType::FleetOwned, "NCR");
//!
//! let decision = evaluator.evaluate(&principal, &resource, Action::ViewVehiclesBasic);
//! assert!(decision.allowed);
//! assert_eq!(sink.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod evaluator;
pub mod regional;
pub mod sensitivity;


pub use cache::{CacheConfig, CacheKey, CacheStats, TtlCache};
pub use evaluator::{DEFAULT_INVESTIGATION_WINDOW_DAYS, EvaluatorConfig, PolicyEvaluator};
pub use regional::{RegionalGrant, RegionalScopeValidator};
pub use sensitivity::{DataSensitivityGate, SensitivityViolation};
