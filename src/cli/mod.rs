//! Command-line interface definitions for the `varta` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! deliberately depends on clap alone; domain types live in the library and
//! the binary converts at the boundary.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `varta` binary.
#[derive(Debug, Parser)]
#[command(
    name = "varta",
    about = "Remote operations for a small VPS fleet over plain SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Capture a backup of a registered server into the local store.
    #[command(name = "backup", about = "Capture a backup of a registered server")]
    Backup(BackupCommand),
    /// Replay a captured backup onto a registered server.
    #[command(name = "restore", about = "Replay a captured backup onto a server")]
    Restore(RestoreCommand),
    /// Run the maintenance sequence on a registered server.
    #[command(name = "maintain", about = "Update, health-check, and reboot a server")]
    Maintain(MaintainCommand),
    /// List captured backups for a server.
    #[command(name = "backups", about = "List captured backups for a server, newest first")]
    Backups(BackupsCommand),
    /// List backup directories that no registered server owns.
    #[command(name = "orphans", about = "List backup directories no registered server owns")]
    Orphans,
    /// Register an existing server by hand.
    #[command(name = "register", about = "Register an existing server by hand")]
    Register(RegisterCommand),
    /// List registered servers.
    #[command(name = "servers", about = "List registered servers")]
    Servers,
}

/// Operating mode accepted on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ModeArg {
    /// Runs the container platform stack under `/opt/platform`.
    Managed,
    /// Plain host with system-level configuration only.
    Bare,
}

/// Arguments for the `varta backup` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct BackupCommand {
    /// Name of the registered server to back up.
    pub(crate) server: String,
}

/// Arguments for the `varta restore` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RestoreCommand {
    /// Name of the registered server to restore onto.
    pub(crate) server: String,
    /// Timestamp token of the backup to replay, as shown by `varta backups`.
    #[arg(long = "backup", value_name = "TOKEN")]
    pub(crate) token: String,
    /// Permit the destructive restore sequence for this invocation.
    ///
    /// Restore overwrites the server's database and configuration. Without
    /// this flag the command refuses to start.
    #[arg(long)]
    pub(crate) unsafe_mode: bool,
}

/// Arguments for the `varta maintain` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct MaintainCommand {
    /// Name of the registered server to maintain.
    pub(crate) server: String,
    /// Skip the reboot phase. The final health check still runs.
    #[arg(long)]
    pub(crate) skip_reboot: bool,
}

/// Arguments for the `varta backups` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct BackupsCommand {
    /// Name of the server whose backups to list.
    pub(crate) server: String,
}

/// Arguments for the `varta register` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RegisterCommand {
    /// Unique name for the server; also names its backup namespace.
    pub(crate) name: String,
    /// Public IPv4 address of the server.
    #[arg(long, value_name = "ADDR")]
    pub(crate) ip: String,
    /// Vendor label recorded on the server record.
    #[arg(long, value_name = "NAME", default_value = "manual")]
    pub(crate) provider: String,
    /// Region label recorded on the server record.
    #[arg(long, value_name = "REGION", default_value = "unknown")]
    pub(crate) region: String,
    /// Size label recorded on the server record.
    #[arg(long, value_name = "SIZE", default_value = "unknown")]
    pub(crate) size: String,
    /// Operating mode of the server.
    #[arg(long, value_enum, default_value_t = ModeArg::Managed)]
    pub(crate) mode: ModeArg,
}
