//! Fleet maintenance engine.
//!
//! [`Maintainer`] walks one server through a fixed five-phase sequence:
//! status check, platform update, health check, reboot, final health check.
//! Every phase lands in the returned step log; a hard failure marks the
//! remaining dependent phases as skipped rather than dropping them. The
//! health check is deliberately soft so a stale endpoint cannot block a
//! scheduled reboot.

pub mod config;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::channel::{
    ChannelConfig, ChannelError, CommandRunner, SshChannel, TokioProcessRunner, exit_description,
};
use crate::probe;
use crate::provider::{CloudProvider, ServerStatus};
use crate::record::{ServerIdentity, ServerMode, ServerRecord};
use crate::report::{StepResult, overall_success};

pub use config::{MaintenanceConfig, MaintenanceConfigLoadError};

const PHASE_STATUS: &str = "status-check";
const PHASE_UPDATE: &str = "update";
const PHASE_HEALTH: &str = "health-check";
const PHASE_REBOOT: &str = "reboot";
const PHASE_FINAL: &str = "final-check";

const MANAGED_UPDATE_COMMAND: &str =
    "cd /opt/platform && docker compose pull && docker compose up -d";
const BARE_UPDATE_COMMAND: &str = "DEBIAN_FRONTEND=noninteractive apt-get update && \
     DEBIAN_FRONTEND=noninteractive apt-get upgrade -y";

/// Errors surfaced while building the maintenance engine.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set VARTA_MAINT_{env_suffix} or add {field} to varta.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when the execution channel faults during construction.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Caller-selected toggles for one maintenance run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MaintenanceOptions {
    /// Skips the reboot phase when set.
    pub skip_reboot: bool,
}

/// Walks servers through the five-phase maintenance sequence.
#[derive(Clone, Debug)]
pub struct Maintainer<R: CommandRunner> {
    channel: SshChannel<R>,
    config: MaintenanceConfig,
}

impl Maintainer<TokioProcessRunner> {
    /// Wires the engine from validated configuration with the real process
    /// runner.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::InvalidConfig`] or
    /// [`MaintenanceError::Channel`] when either configuration fails
    /// validation.
    pub fn with_process_runner(
        ssh: ChannelConfig,
        config: MaintenanceConfig,
    ) -> Result<Self, MaintenanceError> {
        config.validate()?;
        let channel = SshChannel::with_process_runner(ssh)?;
        Ok(Self::new(channel, config))
    }
}

impl<R: CommandRunner> Maintainer<R> {
    /// Creates an engine from already-built collaborators.
    #[must_use]
    pub const fn new(channel: SshChannel<R>, config: MaintenanceConfig) -> Self {
        Self { channel, config }
    }

    /// Runs the five-phase maintenance sequence against one server.
    ///
    /// Never fails as a whole: faults land in the step log as phase
    /// failures, and phases that depend on a failed one are marked skipped.
    pub async fn maintain<P: CloudProvider>(
        &self,
        provider: &P,
        record: &ServerRecord,
        options: &MaintenanceOptions,
    ) -> Vec<StepResult> {
        info!(
            server = %record.name,
            mode = record.mode.as_str(),
            "starting maintenance"
        );
        let mut steps = Vec::with_capacity(5);

        if !self.status_check(provider, record, &mut steps).await {
            warn!(server = %record.name, "server is not running; skipping maintenance");
            abort_remaining(
                &mut steps,
                &[PHASE_UPDATE, PHASE_HEALTH, PHASE_REBOOT, PHASE_FINAL],
                "server not running",
            );
            return steps;
        }

        if !self.update(record, &mut steps).await {
            warn!(server = %record.name, "update failed; aborting maintenance");
            abort_remaining(
                &mut steps,
                &[PHASE_HEALTH, PHASE_REBOOT, PHASE_FINAL],
                "update failed",
            );
            return steps;
        }

        self.health_phase(record, PHASE_HEALTH, &mut steps).await;

        if self.reboot(provider, record, options, &mut steps).await {
            self.health_phase(record, PHASE_FINAL, &mut steps).await;
        } else {
            steps.push(StepResult::skipped(PHASE_FINAL, "reboot failed"));
        }

        info!(
            server = %record.name,
            success = overall_success(&steps),
            "maintenance finished"
        );
        steps
    }

    /// Phase 1. Returns `false` on a hard abort.
    async fn status_check<P: CloudProvider>(
        &self,
        provider: &P,
        record: &ServerRecord,
        steps: &mut Vec<StepResult>,
    ) -> bool {
        let ServerIdentity::Vendor(id) = &record.identity else {
            steps.push(StepResult::skipped(
                PHASE_STATUS,
                "manual server; assumed running",
            ));
            return true;
        };
        match provider.server_status(id).await {
            Ok(ServerStatus::Running) => {
                steps.push(StepResult::success(PHASE_STATUS));
                true
            }
            Ok(status) => {
                steps.push(StepResult::failure(
                    PHASE_STATUS,
                    format!("server status is {status:?}, not running"),
                ));
                false
            }
            Err(err) => {
                steps.push(StepResult::failure(PHASE_STATUS, err.to_string()));
                false
            }
        }
    }

    /// Phase 2. Returns `false` on a hard abort.
    async fn update(&self, record: &ServerRecord, steps: &mut Vec<StepResult>) -> bool {
        let command = update_command(record.mode);
        debug!(server = %record.name, "running update command");
        match self.channel.run_session(&record.ip, command).await {
            Ok(output) if output.is_success() => {
                steps.push(StepResult::success(PHASE_UPDATE));
                true
            }
            Ok(output) => {
                steps.push(StepResult::failure(PHASE_UPDATE, exit_description(&output)));
                false
            }
            Err(err) => {
                steps.push(StepResult::failure(PHASE_UPDATE, err.to_string()));
                false
            }
        }
    }

    /// Phases 3 and 5: bounded health poll, recorded soft.
    async fn health_phase(
        &self,
        record: &ServerRecord,
        phase: &'static str,
        steps: &mut Vec<StepResult>,
    ) {
        let healthy = probe::poll_service(
            &record.ip,
            self.config.health_port,
            &self.config.health_path,
            self.config.health_attempts,
            Duration::from_secs(self.config.health_interval_secs),
        )
        .await;
        if healthy {
            steps.push(StepResult::success(phase));
        } else {
            steps.push(StepResult::failure_with_hint(
                phase,
                format!(
                    "service did not answer after {} attempts",
                    self.config.health_attempts
                ),
                "check the service logs on the server",
            ));
        }
    }

    /// Phase 4. Returns `true` when phase 5 should still run, which covers
    /// both a successful reboot and a deliberately skipped one.
    async fn reboot<P: CloudProvider>(
        &self,
        provider: &P,
        record: &ServerRecord,
        options: &MaintenanceOptions,
        steps: &mut Vec<StepResult>,
    ) -> bool {
        if options.skip_reboot {
            steps.push(StepResult::skipped(PHASE_REBOOT, "reboot disabled for this run"));
            return true;
        }
        let ServerIdentity::Vendor(id) = &record.identity else {
            steps.push(StepResult::skipped(
                PHASE_REBOOT,
                "manual server; no vendor reboot",
            ));
            return true;
        };

        if let Err(err) = provider.reboot_server(id).await {
            steps.push(StepResult::failure(PHASE_REBOOT, err.to_string()));
            return false;
        }
        debug!(server = %record.name, "reboot issued; waiting for the server to settle");
        tokio::time::sleep(Duration::from_secs(self.config.reboot_settle_secs)).await;

        match probe::poll_server_running(
            provider,
            id,
            self.config.status_attempts,
            Duration::from_secs(self.config.status_interval_secs),
        )
        .await
        {
            Ok(true) => {
                steps.push(StepResult::success(PHASE_REBOOT));
                true
            }
            Ok(false) => {
                steps.push(StepResult::failure(
                    PHASE_REBOOT,
                    format!(
                        "server did not come back within {} status checks",
                        self.config.status_attempts
                    ),
                ));
                false
            }
            Err(err) => {
                steps.push(StepResult::failure(PHASE_REBOOT, err.to_string()));
                false
            }
        }
    }
}

const fn update_command(mode: ServerMode) -> &'static str {
    match mode {
        ServerMode::Managed => MANAGED_UPDATE_COMMAND,
        ServerMode::Bare => BARE_UPDATE_COMMAND,
    }
}

fn abort_remaining(steps: &mut Vec<StepResult>, phases: &[&'static str], reason: &str) {
    for phase in phases {
        steps.push(StepResult::skipped(*phase, reason));
    }
}

#[cfg(test)]
mod tests;
