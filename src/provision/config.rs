//! Provisioning configuration.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Provisioning settings loaded via `ortho-config`.
///
/// Only the boot poll is configurable here; the pending-IP poll budget is
/// vendor-specific and lives in
/// [`placement::VendorProfile`](super::placement::VendorProfile).
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VARTA_PROVISION",
    discovery(
        app_name = "varta",
        env_var = "VARTA_CONFIG_PATH",
        config_file_name = "varta.toml",
        dotfile_name = ".varta.toml",
        project_file_name = "varta.toml"
    )
)]
pub struct ProvisionConfig {
    /// Status poll attempts while waiting for a new server to boot.
    #[ortho_config(default = 30)]
    pub boot_attempts: u32,
    /// Seconds between boot status poll attempts.
    #[ortho_config(default = 10)]
    pub boot_interval_secs: u64,
}

/// Errors raised when loading the provisioning configuration from layered
/// sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProvisionConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("provisioning configuration parsing failed: {0}")]
    Parse(String),
}

impl ProvisionConfig {
    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionConfigLoadError::Parse`] when merging sources
    /// fails.
    pub fn load_without_cli_args() -> Result<Self, ProvisionConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("varta")])
            .map_err(|err| ProvisionConfigLoadError::Parse(err.to_string()))
    }
}
