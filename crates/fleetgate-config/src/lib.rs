//! Configuration management for Fleetgate
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (FLEETGATE_* prefix, `__` between section and key)
//! 2. fleetgate.local.toml (gitignored, local overrides)
//! 3. fleetgate.toml (git-tracked, deployment config)
//! 4. ~/.config/fleetgate/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The ownership matrix is either the built-in default or a TOML document
//! named by `policy.matrix_file`. Either way it is validated before use.

use anyhow::Result;
use fleetgate_rbac::OwnershipAccessMatrix;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::ConfigPaths;

/// Longest cache entry lifetime and sweep interval (one day).
pub const MAX_CACHE_SECS: u64 = 86_400;

/// Largest audit queue the recorder will allocate.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

pub const MAX_RETRIES: u32 = 10;

/// Longest audit retry delay (one minute).
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Longest investigation grant (one year).
pub const MAX_INVESTIGATION_WINDOW_DAYS: u32 = 365;

/// Main Fleetgate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetgateConfig {
    pub cache: CacheSettings,
    pub audit: AuditSettings,
    pub policy: PolicySettings,
}

/// Decision and access-policy cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Where audit events are delivered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// One structured log line per event.
    Tracing,
    /// Append JSON lines to `audit.log_file`.
    JsonLines,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub sink: AuditSinkKind,
    pub log_file: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Tracing,
            log_file: PathBuf::from("fleetgate-audit.jsonl"),
            queue_capacity: 10_000,
            batch_size: 256,
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub investigation_window_days: u32,
    /// TOML ownership-matrix document. Built-in matrix when unset.
    pub matrix_file: Option<PathBuf>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            investigation_window_days: 7,
            matrix_file: None,
        }
    }
}

impl PolicySettings {
    /// Loads and validates the ownership matrix.
    pub fn load_matrix(&self) -> Result<OwnershipAccessMatrix, ConfigError> {
        match &self.matrix_file {
            Some(path) => load_matrix_file(path),
            None => Ok(OwnershipAccessMatrix::default_matrix()?),
        }
    }
}

/// Reads a TOML ownership-matrix document.
///
/// Unknown roles, actions or ownership types fail deserialization; structural
/// problems (missing rows, duplicated actions, non-nested roles) fail
/// validation. Both surface as `ParseError`.
pub fn load_matrix_file(path: impl AsRef<Path>) -> Result<OwnershipAccessMatrix, ConfigError> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&document).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

impl FleetgateConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks value ranges the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs must be positive when the cache is enabled".to_string(),
            ));
        }
        at_most("cache.ttl_secs", self.cache.ttl_secs, MAX_CACHE_SECS)?;
        at_most(
            "cache.sweep_interval_secs",
            self.cache.sweep_interval_secs,
            MAX_CACHE_SECS,
        )?;
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "audit.queue_capacity must be positive".to_string(),
            ));
        }
        if self.audit.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "audit.batch_size must be positive".to_string(),
            ));
        }
        at_most("audit.queue_capacity", self.audit.queue_capacity, MAX_QUEUE_CAPACITY)?;
        at_most("audit.batch_size", self.audit.batch_size, self.audit.queue_capacity)?;
        at_most("audit.max_retries", self.audit.max_retries, MAX_RETRIES)?;
        at_most("audit.max_backoff_ms", self.audit.max_backoff_ms, MAX_BACKOFF_MS)?;
        if self.audit.initial_backoff_ms > self.audit.max_backoff_ms {
            return Err(ConfigError::ValidationError(format!(
                "audit.initial_backoff_ms ({}) exceeds audit.max_backoff_ms ({})",
                self.audit.initial_backoff_ms, self.audit.max_backoff_ms
            )));
        }
        if self.policy.investigation_window_days == 0 {
            return Err(ConfigError::ValidationError(
                "policy.investigation_window_days must be positive".to_string(),
            ));
        }
        at_most(
            "policy.investigation_window_days",
            self.policy.investigation_window_days,
            MAX_INVESTIGATION_WINDOW_DAYS,
        )?;
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.audit.log_file.is_relative() {
            self.audit.log_file = base.join(&self.audit.log_file);
        }

        if let Some(matrix_file) = &self.policy.matrix_file {
            if matrix_file.is_relative() {
                self.policy.matrix_file = Some(base.join(matrix_file));
            }
        }
    }
}

fn at_most<T: PartialOrd + std::fmt::Display>(key: &str, value: T, max: T) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::ValidationError(format!(
            "{key} ({value}) exceeds the maximum of {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_types::{Action, OwnershipType, Role, Tier};
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = FleetgateConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.audit.queue_capacity, 10_000);
        assert_eq!(config.audit.sink, AuditSinkKind::Tracing);
        assert_eq!(config.policy.investigation_window_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_backoff() {
        let mut config = FleetgateConfig::default();
        config.audit.initial_backoff_ms = 5_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_allows_zero_ttl_when_disabled() {
        let mut config = FleetgateConfig::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_oversized_values() {
        let oversized: [fn(&mut FleetgateConfig); 7] = [
            |c| c.cache.ttl_secs = u64::MAX,
            |c| c.cache.sweep_interval_secs = MAX_CACHE_SECS + 1,
            |c| c.audit.queue_capacity = MAX_QUEUE_CAPACITY + 1,
            |c| c.audit.batch_size = c.audit.queue_capacity + 1,
            |c| c.audit.max_retries = MAX_RETRIES + 1,
            |c| c.audit.max_backoff_ms = MAX_BACKOFF_MS + 1,
            |c| c.policy.investigation_window_days = u32::MAX,
        ];
        for apply in oversized {
            let mut config = FleetgateConfig::default();
            apply(&mut config);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ValidationError(_))
            ));
        }

        let mut config = FleetgateConfig::default();
        config.cache.ttl_secs = MAX_CACHE_SECS;
        config.policy.investigation_window_days = MAX_INVESTIGATION_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = FleetgateConfig::default();
        config.policy.matrix_file = Some(PathBuf::from("policy/matrix.toml"));
        config.resolve_paths("/srv/fleetgate");

        assert_eq!(
            config.audit.log_file,
            PathBuf::from("/srv/fleetgate/fleetgate-audit.jsonl")
        );
        assert_eq!(
            config.policy.matrix_file,
            Some(PathBuf::from("/srv/fleetgate/policy/matrix.toml"))
        );
    }

    #[test]
    fn test_default_matrix_when_no_file() {
        let matrix = PolicySettings::default().load_matrix().unwrap();
        assert_eq!(
            matrix.tier_of(OwnershipType::FleetOwned, Action::ApproveVehiclePurchases),
            Some(Tier::Financial)
        );
    }

    #[test]
    fn test_matrix_file_round_trip() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("matrix.toml");

        let matrix = OwnershipAccessMatrix::default_matrix().unwrap();
        std::fs::write(&path, toml::to_string(&matrix).unwrap()).unwrap();

        let loaded = load_matrix_file(&path).unwrap();
        assert_eq!(loaded, matrix);
        assert!(loaded.authorizes(Role::Executive, OwnershipType::DriverOwned, Tier::Restricted));
    }

    #[test]
    fn test_matrix_file_missing() {
        let result = load_matrix_file("/nonexistent/fleetgate/matrix.toml");
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_matrix_file_with_unknown_role() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("matrix.toml");
        std::fs::write(
            &path,
            r#"
[platform_owned.roles]
basic = ["janitor"]
"#,
        )
        .unwrap();

        let result = load_matrix_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
