//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::channel::{ChannelError, CommandRunner, ExecOutput, ProcessLimits, RunnerFuture};
use crate::provider::{
    CloudProvider, CreateServerRequest, CreatedServer, ProviderFuture, ServerDetails, ServerStatus,
    SnapshotInfo,
};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic remote outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<ExecOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a watchdog-expired response.
    pub fn push_timeout(&self) {
        self.push_response(ExecOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::from("terminated by watchdog"),
            timed_out: true,
        });
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.push_response(ExecOutput {
            exit_code: code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        });
    }

    fn push_response(&self, output: ExecOutput) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(output);
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        _limits: ProcessLimits,
    ) -> RunnerFuture<'a, ExecOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
            });
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Box::pin(async move {
            response.ok_or_else(|| ChannelError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
        })
    }
}

/// Error returned by [`ScriptedProvider`] failure flags.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct ScriptedProviderError {
    /// Description of the scripted failure.
    pub message: String,
}

impl ScriptedProviderError {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

#[derive(Debug)]
struct ProviderScript {
    statuses: VecDeque<ServerStatus>,
    steady_status: ServerStatus,
    detail_ips: VecDeque<Option<String>>,
    steady_detail_ip: Option<String>,
    create_ip: String,
    fail_token_validation: bool,
    fail_create: bool,
    fail_reboot: bool,
    fail_key_upload: bool,
    calls: Vec<&'static str>,
    create_requests: Vec<CreateServerRequest>,
}

impl Default for ProviderScript {
    fn default() -> Self {
        Self {
            statuses: VecDeque::new(),
            steady_status: ServerStatus::Running,
            detail_ips: VecDeque::new(),
            steady_detail_ip: None,
            create_ip: String::from("203.0.113.10"),
            fail_token_validation: false,
            fail_create: false,
            fail_reboot: false,
            fail_key_upload: false,
            calls: Vec::new(),
            create_requests: Vec::new(),
        }
    }
}

/// Scripted [`CloudProvider`] double with queued statuses and failure flags.
///
/// Status and detail queues drain in FIFO order; once a queue is empty the
/// last popped value repeats forever, so a script like `[Provisioning,
/// Running]` settles into a steady running state.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<ProviderScript>>,
}

impl ScriptedProvider {
    /// Creates a provider that reports a running server and accepts every
    /// operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one vendor status response.
    pub fn push_status(&self, status: ServerStatus) {
        self.lock_script().statuses.push_back(status);
    }

    /// Queues one `server_details` IP response.
    pub fn push_detail_ip(&self, ip: Option<&str>) {
        self.lock_script()
            .detail_ips
            .push_back(ip.map(str::to_owned));
    }

    /// Sets the IP returned by `create_server`.
    pub fn set_create_ip(&self, ip: &str) {
        self.lock_script().create_ip = ip.to_owned();
    }

    /// Makes `validate_token` fail.
    pub fn fail_token_validation(&self) {
        self.lock_script().fail_token_validation = true;
    }

    /// Makes `create_server` fail.
    pub fn fail_create(&self) {
        self.lock_script().fail_create = true;
    }

    /// Makes `reboot_server` fail.
    pub fn fail_reboot(&self) {
        self.lock_script().fail_reboot = true;
    }

    /// Makes `upload_ssh_key` fail.
    pub fn fail_key_upload(&self) {
        self.lock_script().fail_key_upload = true;
    }

    /// Returns the operation names invoked so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock_script().calls.clone()
    }

    /// Returns the create requests received so far.
    #[must_use]
    pub fn create_requests(&self) -> Vec<CreateServerRequest> {
        self.lock_script().create_requests.clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, ProviderScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str) {
        self.lock_script().calls.push(operation);
    }

    fn next_status(&self) -> ServerStatus {
        let mut script = self.lock_script();
        if let Some(status) = script.statuses.pop_front() {
            script.steady_status = status;
        }
        script.steady_status
    }

    fn next_detail_ip(&self) -> Option<String> {
        let mut script = self.lock_script();
        if let Some(ip) = script.detail_ips.pop_front() {
            script.steady_detail_ip = ip;
        }
        script.steady_detail_ip.clone()
    }

    fn ready<'a, T>(
        value: Result<T, ScriptedProviderError>,
    ) -> ProviderFuture<'a, T, ScriptedProviderError>
    where
        T: Send + 'a,
    {
        Box::pin(async move { value })
    }
}

impl CloudProvider for ScriptedProvider {
    type Error = ScriptedProviderError;

    fn validate_token<'a>(&'a self) -> ProviderFuture<'a, (), Self::Error> {
        self.record("validate_token");
        let fail = self.lock_script().fail_token_validation;
        Self::ready(if fail {
            Err(ScriptedProviderError::new("token rejected"))
        } else {
            Ok(())
        })
    }

    fn create_server<'a>(
        &'a self,
        request: &'a CreateServerRequest,
    ) -> ProviderFuture<'a, CreatedServer, Self::Error> {
        self.record("create_server");
        let mut script = self.lock_script();
        script.create_requests.push(request.clone());
        let result = if script.fail_create {
            Err(ScriptedProviderError::new("create refused"))
        } else {
            Ok(CreatedServer {
                id: String::from("srv-scripted-1"),
                ip: script.create_ip.clone(),
            })
        };
        drop(script);
        Self::ready(result)
    }

    fn server_status<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, ServerStatus, Self::Error> {
        self.record("server_status");
        Self::ready(Ok(self.next_status()))
    }

    fn server_details<'a>(
        &'a self,
        id: &'a str,
    ) -> ProviderFuture<'a, ServerDetails, Self::Error> {
        self.record("server_details");
        let details = ServerDetails {
            id: id.to_owned(),
            status: self.next_status(),
            ip: self.next_detail_ip(),
        };
        Self::ready(Ok(details))
    }

    fn reboot_server<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        self.record("reboot_server");
        let fail = self.lock_script().fail_reboot;
        Self::ready(if fail {
            Err(ScriptedProviderError::new("reboot refused"))
        } else {
            Ok(())
        })
    }

    fn destroy_server<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        self.record("destroy_server");
        Self::ready(Ok(()))
    }

    fn upload_ssh_key<'a>(
        &'a self,
        _label: &'a str,
        _public_key: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error> {
        self.record("upload_ssh_key");
        let fail = self.lock_script().fail_key_upload;
        Self::ready(if fail {
            Err(ScriptedProviderError::new("key upload refused"))
        } else {
            Ok(String::from("key-scripted-1"))
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        id: &'a str,
        label: &'a str,
    ) -> ProviderFuture<'a, SnapshotInfo, Self::Error> {
        self.record("create_snapshot");
        let snapshot = SnapshotInfo {
            id: format!("snap-{id}"),
            label: label.to_owned(),
            created_at: None,
        };
        Self::ready(Ok(snapshot))
    }

    fn list_snapshots<'a>(
        &'a self,
        _id: &'a str,
    ) -> ProviderFuture<'a, Vec<SnapshotInfo>, Self::Error> {
        self.record("list_snapshots");
        Self::ready(Ok(Vec::new()))
    }

    fn delete_snapshot<'a>(&'a self, _snapshot_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        self.record("delete_snapshot");
        Self::ready(Ok(()))
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );
        Self::apply(pairs.iter().map(|&(key, value)| (key, Some(value))).collect()).await
    }

    /// Removes multiple environment variables while holding a global mutex.
    pub async fn unset_vars(keys: &[&str]) -> Self {
        Self::apply(keys.iter().map(|&key| (key, None)).collect()).await
    }

    async fn apply(changes: Vec<(&str, Option<&str>)>) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            previous.push((key.to_owned(), env::var_os(key)));
            // SAFETY: mutation is serialised by the `ENV_LOCK` guard held above.
            unsafe {
                match value {
                    Some(new) => env::set_var(key, new),
                    None => env::remove_var(key),
                }
            }
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // Reverse order so the first capture of a repeated key wins.
        while let Some((key, old)) = self.previous.pop() {
            // SAFETY: mutation stays serialised until `_guard` is released.
            unsafe {
                match old {
                    Some(value) => env::set_var(&key, value),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}
