//! Maintenance engine configuration.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::MaintenanceError;

/// Maintenance settings loaded via `ortho-config`.
///
/// Attempt counts and intervals bound the health and post-reboot status
/// polls; the settle period gives a rebooting server time to drop off the
/// network before the first status query.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VARTA_MAINT",
    discovery(
        app_name = "varta",
        env_var = "VARTA_CONFIG_PATH",
        config_file_name = "varta.toml",
        dotfile_name = ".varta.toml",
        project_file_name = "varta.toml"
    )
)]
pub struct MaintenanceConfig {
    /// TCP port the service health endpoint listens on.
    #[ortho_config(default = 8080)]
    pub health_port: u16,
    /// HTTP path of the health endpoint.
    #[ortho_config(default = "/health".to_owned())]
    pub health_path: String,
    /// Health poll attempts per check phase.
    #[ortho_config(default = 5)]
    pub health_attempts: u32,
    /// Seconds between health poll attempts.
    #[ortho_config(default = 6)]
    pub health_interval_secs: u64,
    /// Status poll attempts after a reboot.
    #[ortho_config(default = 10)]
    pub status_attempts: u32,
    /// Seconds between post-reboot status poll attempts.
    #[ortho_config(default = 6)]
    pub status_interval_secs: u64,
    /// Seconds to wait after issuing a reboot before the first status poll.
    #[ortho_config(default = 30)]
    pub reboot_settle_secs: u64,
}

/// Errors raised when loading the maintenance configuration from layered
/// sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MaintenanceConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("maintenance configuration parsing failed: {0}")]
    Parse(String),
}

impl MaintenanceConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::InvalidConfig`] when a required field is
    /// empty.
    pub fn validate(&self) -> Result<(), MaintenanceError> {
        if self.health_path.trim().is_empty() {
            return Err(MaintenanceError::InvalidConfig {
                field: String::from("health_path"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceConfigLoadError::Parse`] when merging sources
    /// fails.
    pub fn load_without_cli_args() -> Result<Self, MaintenanceConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("varta")])
            .map_err(|err| MaintenanceConfigLoadError::Parse(err.to_string()))
    }
}
