//! Configuration loader with multi-source merging

use crate::{ConfigPaths, FleetgateConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_overrides: Option<config::Map<String, String>>,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "FLEETGATE".to_string(),
            env_overrides: None,
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "FLEETGATE")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read environment overrides from `vars` instead of the process
    /// environment.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_overrides = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Skip the operator defaults in the platform config dir
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Config files that exist and will be merged, lowest precedence first
    pub fn sources(&self) -> Vec<PathBuf> {
        ConfigPaths::new()
            .layers(&self.project_dir, self.include_user_config)
            .into_iter()
            .filter(|f| f.exists())
            .collect()
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<FleetgateConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = FleetgateConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project and local config files
        for file in self.sources() {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (FLEETGATE_CACHE__TTL_SECS=60)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_overrides.clone()),
        );

        // Build and deserialize
        let config = builder.build().context("Failed to build configuration")?;

        let mut fleetgate_config: FleetgateConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Resolve relative paths
        fleetgate_config.resolve_paths(&self.project_dir);

        fleetgate_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(fleetgate_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditSinkKind;
    use std::fs;
    use tempfile::tempdir;

    fn loader(project_dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .without_user_config()
            .with_env_vars(Vec::<(String, String)>::new())
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.audit.batch_size, 256);
        assert!(config.policy.matrix_file.is_none());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[cache]
ttl_secs = 120

[audit]
sink = "json_lines"
log_file = "audit/events.jsonl"
max_retries = 5

[policy]
investigation_window_days = 14
"#;
        fs::write(project_dir.join("fleetgate.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.cache.ttl_secs, 120);
        assert!(config.cache.enabled);
        assert_eq!(config.audit.sink, AuditSinkKind::JsonLines);
        assert_eq!(config.audit.log_file, project_dir.join("audit/events.jsonl"));
        assert_eq!(config.audit.max_retries, 5);
        assert_eq!(config.policy.investigation_window_days, 14);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("fleetgate.toml"),
            r#"
[cache]
ttl_secs = 120
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("fleetgate.local.toml"),
            r#"
[cache]
ttl_secs = 30
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.cache.ttl_secs, 30);
    }

    #[test]
    fn test_env_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("fleetgate.toml"),
            r#"
[cache]
ttl_secs = 120
"#,
        )
        .expect("Failed to write project config");

        let config = loader(project_dir)
            .with_env_vars([
                ("FLEETGATE_CACHE__TTL_SECS", "15"),
                ("FLEETGATE_AUDIT__QUEUE_CAPACITY", "512"),
            ])
            .load()
            .expect("Failed to load config");

        assert_eq!(config.cache.ttl_secs, 15);
        assert_eq!(config.audit.queue_capacity, 512);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("fleetgate.toml"),
            r#"
[audit]
batch_size = 0
"#,
        )
        .expect("Failed to write project config");

        assert!(loader(project_dir).load().is_err());
    }

    #[test]
    fn test_oversized_values_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("fleetgate.toml"),
            r#"
[policy]
investigation_window_days = 4294967295
"#,
        )
        .expect("Failed to write project config");
        assert!(loader(project_dir).load().is_err());

        let config = loader(project_dir)
            .with_env_vars([
                ("FLEETGATE_POLICY__INVESTIGATION_WINDOW_DAYS", "30"),
                ("FLEETGATE_CACHE__TTL_SECS", "18446744073709551615"),
            ])
            .load();
        assert!(config.is_err());
    }

    #[test]
    fn test_sources_lists_existing_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        assert!(loader(project_dir).sources().is_empty());

        fs::write(project_dir.join("fleetgate.local.toml"), "").unwrap();
        assert_eq!(
            loader(project_dir).sources(),
            vec![project_dir.join("fleetgate.local.toml")]
        );
    }
}
