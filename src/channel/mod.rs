//! SSH/SCP execution channel.
//!
//! All remote work flows through [`SshChannel`], which validates inputs,
//! builds client arguments, and dispatches through a supervised
//! [`CommandRunner`]. Command-level failures (non-zero exits, watchdog
//! expiries) come back as [`ExecOutput`] values; only channel faults use
//! the error path. A host-key mismatch is retried exactly once after the
//! stale cached key is dropped.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, warn};

mod config;
mod process;
mod validate;

pub use config::{ChannelConfig, ChannelConfigLoadError};
pub use process::{
    CAPTURE_CAP, CommandRunner, ExecOutput, KILL_GRACE, ProcessLimits, RunnerFuture,
    TokioProcessRunner,
};
pub use validate::{REMOTE_PATH_REJECTED, validate_ipv4, validate_remote_path};

/// Watchdog budget for one-shot commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Watchdog budget for long-running session commands (dumps, updates).
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Watchdog budget for artifact transfers.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

const HOST_KEY_MISMATCH_MARKERS: [&str; 2] = [
    "REMOTE HOST IDENTIFICATION HAS CHANGED",
    "Host key verification failed",
];

/// Errors surfaced by the execution channel.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ChannelError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set VARTA_SSH_{env_suffix} or add {field} to varta.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when an address is not a dotted-quad IPv4 literal.
    #[error("invalid server address: {address}")]
    InvalidAddress {
        /// Address that failed validation.
        address: String,
    },
    /// Raised when a remote path contains shell metacharacters.
    #[error("remote path contains rejected characters: {path}")]
    InvalidRemotePath {
        /// Path that failed validation.
        path: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a spawned command's exit status cannot be collected.
    #[error("failed while waiting for {program}: {message}")]
    Wait {
        /// Command that was being waited on.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the SSH client is not usable on this host.
    #[error("ssh client unavailable ({program}): {message}; install an OpenSSH client")]
    Preflight {
        /// Binary that failed the check.
        program: String,
        /// Human-readable description of the failure.
        message: String,
    },
}

/// SSH command and transfer channel over a supervised subprocess runner.
#[derive(Clone, Debug)]
pub struct SshChannel<R: CommandRunner> {
    config: ChannelConfig,
    runner: R,
    command_timeout: Duration,
    session_timeout: Duration,
    transfer_timeout: Duration,
}

impl SshChannel<TokioProcessRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::new(config, TokioProcessRunner)
    }
}

impl<R: CommandRunner> SshChannel<R> {
    /// Creates a new channel using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: ChannelConfig, runner: R) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            command_timeout: COMMAND_TIMEOUT,
            session_timeout: SESSION_TIMEOUT,
            transfer_timeout: TRANSFER_TIMEOUT,
        })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Overrides the one-shot command watchdog budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_command_timeout(mut self, budget: Duration) -> Self {
        self.command_timeout = budget;
        self
    }

    /// Overrides the session command watchdog budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_session_timeout(mut self, budget: Duration) -> Self {
        self.session_timeout = budget;
        self
    }

    /// Overrides the transfer watchdog budget.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_transfer_timeout(mut self, budget: Duration) -> Self {
        self.transfer_timeout = budget;
        self
    }

    /// Verifies the external SSH client is invocable.
    ///
    /// Callers run this before starting an engine operation so a missing
    /// client fails fast instead of midway through a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Preflight`] when `ssh -V` cannot be run or
    /// exits non-zero.
    pub async fn preflight(&self) -> Result<(), ChannelError> {
        let args = vec![OsString::from("-V")];
        let limits = ProcessLimits::with_timeout(self.command_timeout);
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args, limits)
            .await
            .map_err(|err| ChannelError::Preflight {
                program: self.config.ssh_bin.clone(),
                message: err.to_string(),
            })?;
        if output.is_success() {
            return Ok(());
        }
        Err(ChannelError::Preflight {
            program: self.config.ssh_bin.clone(),
            message: exit_description(&output),
        })
    }

    /// Runs a one-shot command on the remote host.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidAddress`] before spawning anything
    /// when the address fails validation, and [`ChannelError::Spawn`] when
    /// the client cannot be started.
    pub async fn run_command(&self, ip: &str, command: &str) -> Result<ExecOutput, ChannelError> {
        validate_ipv4(ip)?;
        let args = self.ssh_args(ip, command);
        self.execute(ip, &self.config.ssh_bin, &args, self.command_timeout)
            .await
    }

    /// Runs a long-lived command (dump, archive, update) on the remote host.
    ///
    /// Identical to [`SshChannel::run_command`] apart from the wider
    /// watchdog budget.
    ///
    /// # Errors
    ///
    /// Same error surface as [`SshChannel::run_command`].
    pub async fn run_session(&self, ip: &str, command: &str) -> Result<ExecOutput, ChannelError> {
        validate_ipv4(ip)?;
        let args = self.ssh_args(ip, command);
        self.execute(ip, &self.config.ssh_bin, &args, self.session_timeout)
            .await
    }

    /// Uploads a local file to a remote path via `scp`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidAddress`] or
    /// [`ChannelError::InvalidRemotePath`] before spawning anything when
    /// validation fails, and [`ChannelError::Spawn`] when the client cannot
    /// be started.
    pub async fn upload(
        &self,
        ip: &str,
        local: &Utf8Path,
        remote: &str,
    ) -> Result<ExecOutput, ChannelError> {
        validate_ipv4(ip)?;
        validate_remote_path(remote)?;
        let args = self.scp_args(ip, TransferDirection::Upload { local, remote });
        self.execute(ip, &self.config.scp_bin, &args, self.transfer_timeout)
            .await
    }

    /// Downloads a remote file to a local path via `scp`.
    ///
    /// # Errors
    ///
    /// Same error surface as [`SshChannel::upload`].
    pub async fn download(
        &self,
        ip: &str,
        remote: &str,
        local: &Utf8Path,
    ) -> Result<ExecOutput, ChannelError> {
        validate_ipv4(ip)?;
        validate_remote_path(remote)?;
        let args = self.scp_args(ip, TransferDirection::Download { remote, local });
        self.execute(ip, &self.config.scp_bin, &args, self.transfer_timeout)
            .await
    }

    /// Dispatches through the runner with a single bounded host-key retry.
    async fn execute(
        &self,
        ip: &str,
        program: &str,
        args: &[OsString],
        budget: Duration,
    ) -> Result<ExecOutput, ChannelError> {
        let limits = ProcessLimits::with_timeout(budget);
        let mut retried = false;
        loop {
            debug!(program, ip, "dispatching remote operation");
            let output = self.runner.run(program, args, limits).await?;
            if !retried && host_key_mismatch(&output.stderr) {
                retried = true;
                warn!(ip, "host key mismatch; dropping cached key and retrying once");
                self.forget_host_key(ip).await;
                continue;
            }
            if output.timed_out {
                warn!(program, ip, "remote operation hit its watchdog");
            }
            return Ok(output);
        }
    }

    /// Drops the cached host key for `ip`. Best effort: failures are logged
    /// and otherwise ignored.
    async fn forget_host_key(&self, ip: &str) {
        let args = vec![OsString::from("-R"), OsString::from(ip)];
        let limits = ProcessLimits::with_timeout(self.command_timeout);
        match self.runner.run(&self.config.keygen_bin, &args, limits).await {
            Ok(output) if output.is_success() => {}
            Ok(output) => debug!(ip, stderr = %output.stderr, "could not drop cached host key"),
            Err(err) => debug!(ip, error = %err, "could not drop cached host key"),
        }
    }

    fn ssh_args(&self, ip: &str, command: &str) -> Vec<OsString> {
        let mut args = self.common_options();
        args.push(OsString::from(format!("{}@{ip}", self.config.ssh_user)));
        args.push(OsString::from(command));
        args
    }

    fn scp_args(&self, ip: &str, direction: TransferDirection<'_>) -> Vec<OsString> {
        let mut args = vec![OsString::from("-B")];
        args.extend(self.common_options());
        match direction {
            TransferDirection::Upload { local, remote } => {
                args.push(OsString::from(local.as_str()));
                args.push(OsString::from(self.remote_spec(ip, remote)));
            }
            TransferDirection::Download { remote, local } => {
                args.push(OsString::from(self.remote_spec(ip, remote)));
                args.push(OsString::from(local.as_str()));
            }
        }
        args
    }

    fn remote_spec(&self, ip: &str, remote: &str) -> String {
        format!("{}@{ip}:{remote}", self.config.ssh_user)
    }

    fn common_options(&self) -> Vec<OsString> {
        vec![
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=accept-new"),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )),
        ]
    }
}

enum TransferDirection<'a> {
    Upload {
        local: &'a Utf8Path,
        remote: &'a str,
    },
    Download {
        remote: &'a str,
        local: &'a Utf8Path,
    },
}

fn host_key_mismatch(stderr: &str) -> bool {
    HOST_KEY_MISMATCH_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Renders a failed [`ExecOutput`] as a one-line status summary.
pub(crate) fn exit_description(output: &ExecOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    format!("exit status {status}: {}", output.stderr.trim())
}

#[cfg(test)]
mod tests;
