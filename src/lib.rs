//! Core library for the Varta remote operations orchestrator.
//!
//! The crate drives day-two operations for a small VPS fleet over plain
//! ssh/scp subprocesses: backups with local artifact retention, restores
//! onto freshly provisioned servers, rolling maintenance with health
//! probes, and vendor-agnostic provisioning behind a [`CloudProvider`]
//! trait.

pub mod backup;
pub mod channel;
pub mod gate;
pub mod maintenance;
pub mod probe;
pub mod provider;
pub mod provision;
pub mod record;
pub mod record_store;
pub mod report;
pub mod test_support;
pub mod util;

pub use backup::{
    BackupConfig, BackupConfigLoadError, BackupEngine, BackupError, BackupManifest, BackupOutcome,
    BackupStore, BackupStoreError, RestoreError,
};
pub use channel::{
    ChannelConfig, ChannelConfigLoadError, ChannelError, CommandRunner, ExecOutput, ProcessLimits,
    RunnerFuture, SshChannel, TokioProcessRunner,
};
pub use gate::SafetyGate;
pub use maintenance::{
    MaintenanceConfig, MaintenanceConfigLoadError, MaintenanceError, MaintenanceOptions, Maintainer,
};
pub use provider::{
    CloudProvider, CreateServerRequest, CreateServerRequestBuilder, CreatedServer, NullProvider,
    ProviderError, ProviderFuture, ServerDetails, ServerStatus, SnapshotInfo,
};
pub use provision::{
    BootstrapScripts, LocalKeySource, ProviderFactory, ProvisionConfig, ProvisionConfigLoadError,
    ProvisionError, ProvisionRequest, Provisioned, Provisioner, SshKeySource, SshPublicKey,
    VendorProfile,
};
pub use record::{
    PENDING_IP, RecordStore, RecordStoreError, ServerIdentity, ServerMode, ServerRecord,
};
pub use record_store::JsonRecordStore;
pub use report::{StepOutcome, StepResult, overall_success};
