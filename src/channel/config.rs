//! SSH channel configuration.
//!
//! Settings are loaded via `ortho-config`, which merges defaults,
//! configuration files, and environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::ChannelError;

/// SSH client settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VARTA_SSH",
    discovery(
        app_name = "varta",
        env_var = "VARTA_CONFIG_PATH",
        config_file_name = "varta.toml",
        dotfile_name = ".varta.toml",
        project_file_name = "varta.toml"
    )
)]
pub struct ChannelConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Path to the `ssh-keygen` executable used to drop stale host keys.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub keygen_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// TCP connect timeout handed to the SSH client, in seconds.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
}

/// Errors raised when loading the channel configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ChannelConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl ChannelConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when any required field is
    /// empty.
    pub fn validate(&self) -> Result<(), ChannelError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.keygen_bin, "keygen_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ChannelConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("varta")])
            .map_err(|err| ChannelConfigLoadError::Parse(err.to_string()))
    }

    fn require_value(value: &str, field: &str) -> Result<(), ChannelError> {
        if value.trim().is_empty() {
            return Err(ChannelError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
