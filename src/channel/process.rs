//! Supervised subprocess execution.
//!
//! Every external process the channel spawns runs under a watchdog with an
//! explicit escalation sequence: SIGTERM on expiry, a short grace period,
//! then SIGKILL and a final reap. Output streams are drained concurrently
//! with the wait so a chatty child can never dead-lock on a full pipe, and
//! each stream is capped so a runaway child cannot exhaust memory.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::warn;

use super::ChannelError;

/// Hard cap, in bytes, applied to each captured output stream.
pub const CAPTURE_CAP: usize = 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL once the watchdog fires.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Environment variable name fragments that must never reach a subprocess.
const SECRET_MARKERS: [&str; 4] = ["TOKEN", "SECRET", "PASSWORD", "CREDENTIAL"];

/// Supervision limits applied to a single subprocess run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProcessLimits {
    /// Wall-clock budget before the watchdog terminates the process.
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub grace: Duration,
    /// Maximum bytes retained per output stream.
    pub capture_cap: usize,
}

impl ProcessLimits {
    /// Builds limits with the default grace period and capture cap.
    #[must_use]
    pub const fn with_timeout(budget: Duration) -> Self {
        Self {
            timeout: budget,
            grace: KILL_GRACE,
            capture_cap: CAPTURE_CAP,
        }
    }
}

/// Result of running an external command.
///
/// Non-zero exits and watchdog expiries are values, not errors; only
/// channel faults such as a failed spawn use the `Err` path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    /// Exit code reported by the process, if available.
    pub exit_code: Option<i32>,
    /// Captured standard output, truncated at the capture cap.
    pub stdout: String,
    /// Captured standard error, truncated at the capture cap.
    pub stderr: String,
    /// Whether the watchdog terminated the process.
    pub timed_out: bool,
}

impl ExecOutput {
    /// Returns `true` when the process exited zero without hitting the
    /// watchdog.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0)) && !self.timed_out
    }

    /// Synthetic failure reported after the watchdog killed the process.
    #[must_use]
    pub fn watchdog_expired(budget: Duration) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("terminated by watchdog after {}s", budget.as_secs()),
            timed_out: true,
        }
    }
}

/// Future returned by command runners.
pub type RunnerFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// Abstraction over subprocess execution to support doubles in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments under the supplied limits.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Spawn`] when the process cannot be started
    /// and [`ChannelError::Wait`] when its exit status cannot be collected.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        limits: ProcessLimits,
    ) -> RunnerFuture<'a, ExecOutput>;
}

/// Real runner that spawns processes through tokio.
#[derive(Clone, Debug, Default)]
pub struct TokioProcessRunner;

impl CommandRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        limits: ProcessLimits,
    ) -> RunnerFuture<'a, ExecOutput> {
        Box::pin(run_supervised(program, args, limits))
    }
}

async fn run_supervised(
    program: &str,
    args: &[OsString],
    limits: ProcessLimits,
) -> Result<ExecOutput, ChannelError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env_clear()
        .envs(filtered_environment());

    let mut child = command.spawn().map_err(|err| ChannelError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    })?;

    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    // Both streams are drained concurrently with the wait; a child that
    // fills the OS pipe buffer would otherwise block forever on write.
    tokio::select! {
        result = async {
            let (wait_result, stdout, stderr) = tokio::join!(
                child.wait(),
                read_capped(stdout_handle.as_mut(), limits.capture_cap),
                read_capped(stderr_handle.as_mut(), limits.capture_cap),
            );
            let status = wait_result.map_err(|err| ChannelError::Wait {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
            Ok(ExecOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                timed_out: false,
            })
        } => result,
        () = sleep(limits.timeout) => {
            warn!(
                program,
                timeout_secs = limits.timeout.as_secs(),
                "watchdog expired; terminating process"
            );
            escalate_kill(&mut child, limits.grace).await;
            Ok(ExecOutput::watchdog_expired(limits.timeout))
        }
    }
}

/// Escalation applied once the watchdog fires: SIGTERM, a bounded grace
/// wait, then SIGKILL with a final reap.
async fn escalate_kill(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id().and_then(|raw| i32::try_from(raw).ok()) {
        kill(Pid::from_raw(pid), Signal::SIGTERM).ok();
        if timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "process survived SIGTERM; escalating to SIGKILL");
    }
    child.kill().await.ok();
}

/// Drains `reader` to completion, retaining at most `cap` bytes.
///
/// Bytes beyond the cap are read and dropped so the child keeps making
/// progress even after the capture limit is reached.
async fn read_capped<R>(reader: Option<&mut R>, cap: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = reader else {
        return Vec::new();
    };

    let mut collected = Vec::new();
    let mut chunk = [0_u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                let room = cap.saturating_sub(collected.len());
                let take = room.min(read);
                if let Some(bytes) = chunk.get(..take) {
                    collected.extend_from_slice(bytes);
                }
            }
        }
    }
    collected
}

/// Returns `true` when an environment variable name looks credential-bearing.
fn is_secret_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    SECRET_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Parent environment minus credential-bearing variables.
fn filtered_environment() -> Vec<(OsString, OsString)> {
    std::env::vars_os()
        .filter(|(name, _)| !is_secret_name(&name.to_string_lossy()))
        .collect()
}
