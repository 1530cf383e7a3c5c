//! Error types for the Fleetgate service.

use fleetgate_audit::RecorderError;
use fleetgate_config::ConfigError;
use fleetgate_rbac::ConfigurationError;
use thiserror::Error;

/// Result type for service construction.
pub type Result<T> = std::result::Result<T, FleetgateError>;

/// Errors that stop an [`AccessControlService`](crate::AccessControlService)
/// from starting.
///
/// Per-request outcomes are never errors: denials are returned as
/// decisions.
#[derive(Debug, Error)]
pub enum FleetgateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid ownership matrix: {0}")]
    Matrix(#[from] ConfigurationError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("failed to open audit log: {0}")]
    AuditLog(#[from] std::io::Error),
}
