//! # fleetgate-rbac: Role capabilities and row-level security
//!
//! Provides the static, role-driven half of Fleetgate access control:
//! - **Role allow-lists** and coarse capabilities ([`RoleCapabilities`])
//! - **Ownership access matrix** (action tiers and authorized roles per
//!   ownership type)
//! - **Field-level security** (masking and forbidden fields)
//! - **Row-level security** (engine-agnostic predicate filters)
//! - **Write validation** for bulk payloads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Principal + PartialResourceContext          │
//! └─────────────────┬───────────────────────────┘
//!                   │  get_access_policy
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  AccessPolicy                                │
//! │  ├─ regions / ownership types / data classes │
//! │  ├─ read / write / delete                    │
//! │  └─ allowed / masked / forbidden fields      │
//! └───────┬──────────────────────┬──────────────┘
//!         │ build_query_filter    │ filter_results
//!         ▼                       ▼
//! ┌────────────────────┐  ┌─────────────────────┐
//! │ QueryFilter         │  │ Projected rows      │
//! │ predicate + params  │  │ masked / stripped   │
//! └────────────────────┘  └─────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```
//! use fleetgate_rbac::{OwnershipAccessMatrix, QueryOperation, build_query_filter};
//! use fleetgate_types::{PartialResourceContext, Principal, Role};
//!
//! let matrix = OwnershipAccessMatrix::default_matrix()?;
//! let principal = Principal::new("g1", Role::GroundOps).with_region("NCR");
//!
//! let filter = build_query_filter(
//!     &matrix,
//!     &principal,
//!     QueryOperation::Read,
//!     &PartialResourceContext::new(),
//! );
//! assert!(!filter.is_deny_all());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod enforcement;
pub mod fields;
pub mod masking;
pub mod matrix;
pub mod policy;
pub mod roles;

// Re-export commonly used types
pub use enforcement::{
    ParamValue, Predicate, QueryFilter, QueryOperation, WriteDecision, build_query_filter,
    filter_from_policy, filter_results, validate_write,
};
pub use masking::FieldProjector;
pub use matrix::{ConfigurationError, OwnershipAccessMatrix, OwnershipRow, TierSets};
pub use policy::{AccessPolicy, FieldRestrictions, get_access_policy};
pub use roles::RoleCapabilities;
