//! Backup and restore engine.
//!
//! [`BackupEngine`] drives the remote artifact capture for managed and bare
//! servers and replays captured artifacts during restore. Remote failures
//! during backup surface as [`BackupError::Remote`] naming the step that
//! broke; restore instead returns the ordered step log so callers can show
//! exactly which phase failed. Restore is destructive and demands an open
//! [`SafetyGate`] before it touches anything.

mod commands;

pub mod config;
pub mod manifest;
pub mod store;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel::{
    ChannelConfig, ChannelError, CommandRunner, SshChannel, TokioProcessRunner, exit_description,
};
use crate::gate::SafetyGate;
use crate::record::{ServerMode, ServerRecord};
use crate::report::StepResult;

pub use config::{
    BackupConfig, BackupConfigLoadError, DEFAULT_BACKUPS_ROOT, DEFAULT_REMOTE_STAGE_DIR,
};
pub use manifest::{BackupManifest, MANIFEST_FILE_NAME, VERSION_BARE, VERSION_UNKNOWN};
pub use store::{BackupStore, BackupStoreError};

const STEP_UPLOAD: &str = "upload-artifacts";
const STEP_STOP_STACK: &str = "stop-stack";
const STEP_START_DATABASE: &str = "start-database";
const STEP_RESTORE_DATABASE: &str = "restore-database";
const STEP_EXTRACT_CONFIG: &str = "extract-config";
const STEP_START_STACK: &str = "start-stack";
const STEP_EXTRACT_ARCHIVE: &str = "extract-archive";

/// Errors surfaced while creating a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set VARTA_BACKUP_{env_suffix} or add {field} to varta.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a remote backup step exits unsuccessfully.
    #[error("backup step {step} failed on {server}: {detail}")]
    Remote {
        /// Step that failed.
        step: &'static str,
        /// Server the backup was running against.
        server: String,
        /// Exit status and captured stderr.
        detail: String,
    },
    /// Raised when the execution channel faults.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Raised when the local backup store faults.
    #[error(transparent)]
    Store(#[from] BackupStoreError),
}

/// Errors surfaced before a restore sequence starts.
///
/// Failures inside the sequence itself are reported through the step log,
/// not through this enum.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Raised when safe mode blocks the restore.
    #[error("restore is destructive and safe mode is active: pass --unsafe-mode to proceed")]
    SafeMode,
    /// Raised when the requested backup has no manifest.
    #[error("no backup manifest for {server} at {token}")]
    ManifestAbsent {
        /// Server the restore targeted.
        server: String,
        /// Requested timestamp token.
        token: String,
    },
    /// Raised when the manifest names a different server.
    #[error("backup {token} belongs to {manifest_server}, not {server}")]
    ManifestMismatch {
        /// Server the restore targeted.
        server: String,
        /// Server named by the manifest.
        manifest_server: String,
        /// Requested timestamp token.
        token: String,
    },
    /// Raised when manifest-listed artifacts are missing on disk.
    #[error("backup {token} for {server} is incomplete: missing {files:?}")]
    ArtifactsMissing {
        /// Server the restore targeted.
        server: String,
        /// Requested timestamp token.
        token: String,
        /// Artifact names listed in the manifest but absent locally.
        files: Vec<String>,
    },
    /// Raised when the execution channel faults.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// Raised when the local backup store faults.
    #[error(transparent)]
    Store(#[from] BackupStoreError),
}

/// Summary of one successful backup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupOutcome {
    /// Timestamp token naming the backup directory.
    pub token: String,
    /// Local directory holding the artifacts and manifest.
    pub directory: Utf8PathBuf,
    /// Manifest written alongside the artifacts.
    pub manifest: BackupManifest,
}

/// Orchestrates remote backup and restore sequences over an [`SshChannel`].
#[derive(Clone, Debug)]
pub struct BackupEngine<R: CommandRunner> {
    channel: SshChannel<R>,
    store: BackupStore,
    stage_dir: String,
}

impl BackupEngine<TokioProcessRunner> {
    /// Wires the engine from validated configuration with the real process
    /// runner.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidConfig`] or [`BackupError::Channel`]
    /// when either configuration fails validation.
    pub fn with_process_runner(ssh: ChannelConfig, config: &BackupConfig) -> Result<Self, BackupError> {
        config.validate()?;
        let channel = SshChannel::with_process_runner(ssh)?;
        let store = BackupStore::new(config.resolved_root());
        Ok(Self::new(channel, store, config.remote_stage_dir.clone()))
    }
}

impl<R: CommandRunner> BackupEngine<R> {
    /// Creates an engine from already-built collaborators.
    #[must_use]
    pub const fn new(channel: SshChannel<R>, store: BackupStore, stage_dir: String) -> Self {
        Self {
            channel,
            store,
            stage_dir,
        }
    }

    /// Captures a backup of the server and writes it into the local store.
    ///
    /// The procedure is selected by the record's mode. Remote artifacts are
    /// produced first; the local backup directory only comes into existence
    /// once every remote step has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Remote`] when a remote step exits
    /// unsuccessfully, [`BackupError::Channel`] when the channel faults, and
    /// [`BackupError::Store`] when local persistence fails.
    pub async fn backup(&self, record: &ServerRecord) -> Result<BackupOutcome, BackupError> {
        let token = manifest::timestamp_token(Utc::now());
        info!(
            server = %record.name,
            mode = record.mode.as_str(),
            token = %token,
            "starting backup"
        );
        match record.mode {
            ServerMode::Managed => self.backup_managed(record, token).await,
            ServerMode::Bare => self.backup_bare(record, token).await,
        }
    }

    /// Replays a captured backup onto the server.
    ///
    /// The gate is checked before any validation or I/O happens. The
    /// procedure is selected by the manifest's mode, so a mis-tagged backup
    /// fails at its first incompatible remote step instead of silently
    /// running the wrong sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError::SafeMode`] when the gate is closed, the
    /// manifest validation variants when the backup is unusable, and
    /// [`RestoreError::Channel`]/[`RestoreError::Store`] on faults. Remote
    /// step failures are reported inside the returned step log.
    pub async fn restore(
        &self,
        record: &ServerRecord,
        token: &str,
        gate: SafetyGate,
    ) -> Result<Vec<StepResult>, RestoreError> {
        if !gate.allows_destructive() {
            return Err(RestoreError::SafeMode);
        }
        let manifest = self.store.load_manifest(&record.name, token)?.ok_or_else(|| {
            RestoreError::ManifestAbsent {
                server: record.name.clone(),
                token: token.to_owned(),
            }
        })?;
        if manifest.server_name != record.name {
            return Err(RestoreError::ManifestMismatch {
                server: record.name.clone(),
                manifest_server: manifest.server_name,
                token: token.to_owned(),
            });
        }
        let missing = self.store.missing_artifacts(&manifest)?;
        if !missing.is_empty() {
            return Err(RestoreError::ArtifactsMissing {
                server: record.name.clone(),
                token: token.to_owned(),
                files: missing,
            });
        }

        info!(
            server = %record.name,
            token,
            mode = manifest.effective_mode().as_str(),
            "starting restore"
        );
        match manifest.effective_mode() {
            ServerMode::Managed => self.restore_managed(record, token, &manifest).await,
            ServerMode::Bare => self.restore_bare(record, token, &manifest).await,
        }
    }

    async fn backup_managed(
        &self,
        record: &ServerRecord,
        token: String,
    ) -> Result<BackupOutcome, BackupError> {
        let ip = record.ip.as_str();
        let server = record.name.as_str();
        let version = self.platform_version(ip).await;
        let dump_stage = self.stage_path(server, commands::DATABASE_ARTIFACT);
        let config_stage = self.stage_path(server, commands::CONFIG_ARTIFACT);

        self.run_remote_step(
            ip,
            server,
            "database-dump",
            &commands::dump_database_command(&dump_stage),
        )
        .await?;
        self.archive_config(ip, server, &config_stage).await?;

        let directory = self.store.create_backup_dir(server, &token)?;
        self.download_artifact(
            ip,
            server,
            "download-database",
            &dump_stage,
            &directory.join(commands::DATABASE_ARTIFACT),
        )
        .await?;
        self.download_artifact(
            ip,
            server,
            "download-config",
            &config_stage,
            &directory.join(commands::CONFIG_ARTIFACT),
        )
        .await?;

        let manifest = BackupManifest {
            server_name: record.name.clone(),
            provider: record.provider.clone(),
            timestamp: token,
            platform_version: version,
            files: vec![
                commands::DATABASE_ARTIFACT.to_owned(),
                commands::CONFIG_ARTIFACT.to_owned(),
            ],
            mode: None,
        };
        self.store.write_manifest(&manifest)?;
        self.cleanup_stage(ip, &[dump_stage, config_stage]).await;
        info!(server, directory = %directory, "backup complete");
        Ok(BackupOutcome {
            token: manifest.timestamp.clone(),
            directory,
            manifest,
        })
    }

    async fn backup_bare(
        &self,
        record: &ServerRecord,
        token: String,
    ) -> Result<BackupOutcome, BackupError> {
        let ip = record.ip.as_str();
        let server = record.name.as_str();
        let system_stage = self.stage_path(server, commands::SYSTEM_ARTIFACT);

        self.run_remote_step(
            ip,
            server,
            "system-archive",
            &commands::archive_system_command(&system_stage),
        )
        .await?;

        let directory = self.store.create_backup_dir(server, &token)?;
        self.download_artifact(
            ip,
            server,
            "download-system",
            &system_stage,
            &directory.join(commands::SYSTEM_ARTIFACT),
        )
        .await?;

        let manifest = BackupManifest {
            server_name: record.name.clone(),
            provider: record.provider.clone(),
            timestamp: token,
            platform_version: VERSION_BARE.to_owned(),
            files: vec![commands::SYSTEM_ARTIFACT.to_owned()],
            mode: Some(ServerMode::Bare),
        };
        self.store.write_manifest(&manifest)?;
        self.cleanup_stage(ip, &[system_stage]).await;
        info!(server, directory = %directory, "backup complete");
        Ok(BackupOutcome {
            token: manifest.timestamp.clone(),
            directory,
            manifest,
        })
    }

    async fn restore_managed(
        &self,
        record: &ServerRecord,
        token: &str,
        manifest: &BackupManifest,
    ) -> Result<Vec<StepResult>, RestoreError> {
        let ip = record.ip.as_str();
        let server = record.name.as_str();
        let mut steps = Vec::new();

        let Some(staged) = self.upload_artifacts(record, manifest, token, &mut steps).await?
        else {
            return Ok(steps);
        };

        let dump_stage = self.stage_path(server, commands::DATABASE_ARTIFACT);
        let config_stage = self.stage_path(server, commands::CONFIG_ARTIFACT);
        let sequence = [
            (STEP_STOP_STACK, commands::STOP_STACK_COMMAND.to_owned(), false),
            (
                STEP_START_DATABASE,
                commands::START_DATABASE_COMMAND.to_owned(),
                true,
            ),
            (
                STEP_RESTORE_DATABASE,
                commands::restore_database_command(&dump_stage),
                true,
            ),
            (
                STEP_EXTRACT_CONFIG,
                commands::extract_config_command(&config_stage),
                true,
            ),
            (STEP_START_STACK, commands::START_STACK_COMMAND.to_owned(), false),
        ];
        // Rollback applies once the stack is stopped, except at the final
        // start step where it would repeat the command that just failed.
        for (name, command, rollback_on_failure) in sequence {
            let output = self.channel.run_session(ip, &command).await?;
            if output.is_success() {
                steps.push(StepResult::success(name));
                continue;
            }
            steps.push(StepResult::failure(name, exit_description(&output)));
            if rollback_on_failure {
                self.rollback_start_stack(ip, server).await;
            }
            return Ok(steps);
        }

        self.cleanup_stage(ip, &staged).await;
        info!(server, token, "restore complete");
        Ok(steps)
    }

    async fn restore_bare(
        &self,
        record: &ServerRecord,
        token: &str,
        manifest: &BackupManifest,
    ) -> Result<Vec<StepResult>, RestoreError> {
        let ip = record.ip.as_str();
        let server = record.name.as_str();
        let mut steps = Vec::new();

        let Some(staged) = self.upload_artifacts(record, manifest, token, &mut steps).await?
        else {
            return Ok(steps);
        };

        let archive_stage = self.stage_path(server, commands::SYSTEM_ARTIFACT);
        let output = self
            .channel
            .run_session(ip, &commands::extract_system_command(&archive_stage))
            .await?;
        if output.is_success() {
            steps.push(StepResult::success(STEP_EXTRACT_ARCHIVE));
            self.cleanup_stage(ip, &staged).await;
            info!(server, token, "restore complete");
        } else {
            steps.push(StepResult::failure(
                STEP_EXTRACT_ARCHIVE,
                exit_description(&output),
            ));
        }
        Ok(steps)
    }

    /// Uploads every manifest-listed artifact to the remote stage directory.
    ///
    /// Returns the staged remote paths, or `None` after pushing a failure
    /// step; nothing destructive has happened at that point.
    async fn upload_artifacts(
        &self,
        record: &ServerRecord,
        manifest: &BackupManifest,
        token: &str,
        steps: &mut Vec<StepResult>,
    ) -> Result<Option<Vec<String>>, RestoreError> {
        let ip = record.ip.as_str();
        let server = record.name.as_str();
        let mut staged = Vec::with_capacity(manifest.files.len());
        for file in &manifest.files {
            let local = self.store.artifact_path(server, token, file)?;
            let remote = self.stage_path(server, file);
            let output = self.channel.upload(ip, &local, &remote).await?;
            if !output.is_success() {
                warn!(server, file, "artifact upload failed; server left untouched");
                steps.push(StepResult::failure(STEP_UPLOAD, exit_description(&output)));
                return Ok(None);
            }
            staged.push(remote);
        }
        steps.push(StepResult::success_with_detail(
            STEP_UPLOAD,
            format!("staged {} artifacts", staged.len()),
        ));
        Ok(Some(staged))
    }

    /// Reads the platform version marker. Best effort: any failure degrades
    /// to the unknown sentinel.
    async fn platform_version(&self, ip: &str) -> String {
        match self.channel.run_command(ip, commands::VERSION_COMMAND).await {
            Ok(output) if output.is_success() => {
                let version = output.stdout.trim();
                if version.is_empty() {
                    VERSION_UNKNOWN.to_owned()
                } else {
                    version.to_owned()
                }
            }
            Ok(_) => {
                debug!(ip, "platform version probe failed");
                VERSION_UNKNOWN.to_owned()
            }
            Err(err) => {
                debug!(ip, error = %err, "platform version probe failed");
                VERSION_UNKNOWN.to_owned()
            }
        }
    }

    async fn run_remote_step(
        &self,
        ip: &str,
        server: &str,
        step: &'static str,
        command: &str,
    ) -> Result<(), BackupError> {
        debug!(server, step, "running remote backup step");
        let output = self.channel.run_session(ip, command).await?;
        if output.is_success() {
            return Ok(());
        }
        Err(BackupError::Remote {
            step,
            server: server.to_owned(),
            detail: exit_description(&output),
        })
    }

    /// Archives the platform configuration, falling back to the command that
    /// skips the optional env file when the first attempt fails.
    async fn archive_config(
        &self,
        ip: &str,
        server: &str,
        config_stage: &str,
    ) -> Result<(), BackupError> {
        let output = self
            .channel
            .run_session(ip, &commands::archive_config_command(config_stage))
            .await?;
        if output.is_success() {
            return Ok(());
        }
        debug!(server, "config archive failed; retrying without the env file");
        let fallback = self
            .channel
            .run_session(ip, &commands::archive_config_fallback_command(config_stage))
            .await?;
        if fallback.is_success() {
            return Ok(());
        }
        Err(BackupError::Remote {
            step: "config-archive",
            server: server.to_owned(),
            detail: exit_description(&fallback),
        })
    }

    async fn download_artifact(
        &self,
        ip: &str,
        server: &str,
        step: &'static str,
        remote: &str,
        local: &Utf8Path,
    ) -> Result<(), BackupError> {
        let output = self.channel.download(ip, remote, local).await?;
        if output.is_success() {
            return Ok(());
        }
        Err(BackupError::Remote {
            step,
            server: server.to_owned(),
            detail: exit_description(&output),
        })
    }

    /// Starts the full stack back up after a mid-restore failure. Best
    /// effort: its own failure is logged and swallowed.
    async fn rollback_start_stack(&self, ip: &str, server: &str) {
        warn!(server, "restore failed after the stack was stopped; starting everything back up");
        match self.channel.run_session(ip, commands::START_STACK_COMMAND).await {
            Ok(output) if output.is_success() => {}
            Ok(output) => {
                warn!(server, detail = %exit_description(&output), "rollback start failed");
            }
            Err(err) => warn!(server, error = %err, "rollback start failed"),
        }
    }

    /// Removes staged files from the remote temp directory. Best effort:
    /// failures are logged and swallowed.
    async fn cleanup_stage(&self, ip: &str, staged: &[String]) {
        match self
            .channel
            .run_command(ip, &commands::cleanup_command(staged))
            .await
        {
            Ok(output) if output.is_success() => {}
            Ok(output) => {
                debug!(ip, detail = %exit_description(&output), "stage cleanup failed");
            }
            Err(err) => debug!(ip, error = %err, "stage cleanup failed"),
        }
    }

    fn stage_path(&self, server: &str, artifact: &str) -> String {
        let stage = self.stage_dir.trim_end_matches('/');
        format!("{stage}/varta-{server}-{artifact}")
    }
}

#[cfg(test)]
mod tests;
