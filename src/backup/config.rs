//! Backup engine configuration.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::util::expand_tilde;

use super::BackupError;

/// Default local root for backup directories.
pub const DEFAULT_BACKUPS_ROOT: &str = "~/.varta/backups";

/// Default remote directory artifacts are staged in before transfer.
pub const DEFAULT_REMOTE_STAGE_DIR: &str = "/tmp";

/// Backup settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VARTA_BACKUP",
    discovery(
        app_name = "varta",
        env_var = "VARTA_CONFIG_PATH",
        config_file_name = "varta.toml",
        dotfile_name = ".varta.toml",
        project_file_name = "varta.toml"
    )
)]
pub struct BackupConfig {
    /// Local directory holding per-server backup namespaces. A leading `~`
    /// expands to the user's home directory.
    #[ortho_config(default = DEFAULT_BACKUPS_ROOT.to_owned())]
    pub backups_root: String,
    /// Remote directory artifacts are staged in during backup and restore.
    #[ortho_config(default = DEFAULT_REMOTE_STAGE_DIR.to_owned())]
    pub remote_stage_dir: String,
}

/// Errors raised when loading the backup configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackupConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("backup configuration parsing failed: {0}")]
    Parse(String),
}

impl BackupConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidConfig`] when any required field is
    /// empty.
    pub fn validate(&self) -> Result<(), BackupError> {
        Self::require_value(&self.backups_root, "backups_root")?;
        Self::require_value(&self.remote_stage_dir, "remote_stage_dir")?;
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BackupConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, BackupConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("varta")])
            .map_err(|err| BackupConfigLoadError::Parse(err.to_string()))
    }

    /// Returns the backups root with the tilde prefix expanded.
    #[must_use]
    pub fn resolved_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(&self.backups_root))
    }

    fn require_value(value: &str, field: &str) -> Result<(), BackupError> {
        if value.trim().is_empty() {
            return Err(BackupError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
