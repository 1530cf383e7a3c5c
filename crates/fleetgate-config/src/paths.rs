//! Where fleetgate looks for its configuration files.
//!
//! Three TOML layers are merged, lowest precedence first:
//!
//! 1. operator defaults in the platform config dir
//!    (`~/.config/fleetgate/fleetgate.toml` on Linux)
//! 2. the deployment's `fleetgate.toml` next to the service
//! 3. `fleetgate.local.toml`, for host-specific overrides kept out of
//!    version control

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "fleetgate.toml";
const LOCAL_CONFIG_FILE: &str = "fleetgate.local.toml";

/// Resolves the config layers for one deployment directory.
pub struct ConfigPaths {
    project_dirs: Option<ProjectDirs>,
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("com", "Fleetgate", "fleetgate"),
        }
    }

    /// Platform config dir holding operator-wide defaults.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("No home directory to hold operator defaults".to_string())
            })
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join(CONFIG_FILE))
    }

    pub fn deployment_config_file(deployment_dir: impl AsRef<Path>) -> PathBuf {
        deployment_dir.as_ref().join(CONFIG_FILE)
    }

    pub fn local_config_file(deployment_dir: impl AsRef<Path>) -> PathBuf {
        deployment_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }

    /// Every candidate layer in merge order, whether or not it exists.
    ///
    /// A missing home directory drops the operator layer instead of failing;
    /// services often run as users without one.
    pub fn layers(&self, deployment_dir: impl AsRef<Path>, include_user: bool) -> Vec<PathBuf> {
        let deployment_dir = deployment_dir.as_ref();
        let mut layers = Vec::with_capacity(3);
        if include_user {
            layers.extend(self.user_config_file().ok());
        }
        layers.push(Self::deployment_config_file(deployment_dir));
        layers.push(Self::local_config_file(deployment_dir));
        layers
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}
