//! Binary entry point for the Varta CLI.

mod cli;

use std::env;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::Parser;
use thiserror::Error;
use uuid::Uuid;

use cli::{
    BackupCommand, BackupsCommand, Cli, MaintainCommand, ModeArg, RegisterCommand, RestoreCommand,
};
use varta::channel::validate_ipv4;
use varta::{
    BackupConfig, BackupEngine, BackupError, BackupManifest, BackupStore, BackupStoreError,
    ChannelConfig, ChannelError, JsonRecordStore, MaintenanceConfig, MaintenanceError,
    MaintenanceOptions, Maintainer, NullProvider, RecordStore, RecordStoreError, RestoreError,
    SafetyGate, ServerIdentity, ServerMode, ServerRecord, StepOutcome, StepResult,
    TokioProcessRunner, overall_success,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no server named {0} is registered; run `varta servers` to list the fleet")]
    UnknownServer(String),
    #[error(transparent)]
    Records(#[from] RecordStoreError),
    #[error(transparent)]
    Backups(#[from] BackupStoreError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("could not write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VARTA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Backup(command) => backup_command(&command).await,
        Cli::Restore(command) => restore_command(&command).await,
        Cli::Maintain(command) => maintain_command(&command).await,
        Cli::Backups(command) => backups_command(&command),
        Cli::Orphans => orphans_command(),
        Cli::Register(command) => register_command(command),
        Cli::Servers => servers_command(),
    }
}

async fn backup_command(args: &BackupCommand) -> Result<i32, CliError> {
    let store = record_store();
    let record = load_record(&store, &args.server)?;
    let engine = backup_engine()?;
    let outcome = engine.backup(&record).await?;

    let mut stdout = io::stdout();
    writeln!(stdout, "captured {} into {}", outcome.token, outcome.directory)?;
    for file in &outcome.manifest.files {
        writeln!(stdout, "  {file}")?;
    }
    Ok(0)
}

async fn restore_command(args: &RestoreCommand) -> Result<i32, CliError> {
    let store = record_store();
    let record = load_record(&store, &args.server)?;
    let engine = backup_engine()?;
    let gate = SafetyGate::from_unsafe_flag(args.unsafe_mode);
    let steps = engine.restore(&record, &args.token, gate).await?;
    render_steps(io::stdout(), &steps)?;
    Ok(exit_code_for(&steps))
}

async fn maintain_command(args: &MaintainCommand) -> Result<i32, CliError> {
    let store = record_store();
    let record = load_record(&store, &args.server)?;
    let ssh = ChannelConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let config = MaintenanceConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let engine = Maintainer::with_process_runner(ssh, config)?;
    let options = MaintenanceOptions {
        skip_reboot: args.skip_reboot,
    };

    // No vendor client ships in this binary, so vendor phases fail as
    // unsupported for vendor identities and are skipped for manual ones.
    let steps = engine.maintain(&NullProvider, &record, &options).await;
    render_steps(io::stdout(), &steps)?;
    Ok(exit_code_for(&steps))
}

fn backups_command(args: &BackupsCommand) -> Result<i32, CliError> {
    let config = BackupConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let store = BackupStore::new(config.resolved_root());
    let manifests = store.list_backups(&args.server)?;
    render_backup_listing(io::stdout(), &args.server, &manifests)?;
    Ok(0)
}

fn orphans_command() -> Result<i32, CliError> {
    let records = record_store();
    let names: Vec<String> = records
        .load_all()?
        .into_iter()
        .map(|record| record.name)
        .collect();
    let config = BackupConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let store = BackupStore::new(config.resolved_root());
    let orphans = store.scan_orphans(&names)?;
    render_orphan_listing(io::stdout(), &orphans)?;
    Ok(0)
}

fn register_command(args: RegisterCommand) -> Result<i32, CliError> {
    validate_ipv4(&args.ip)?;
    let store = record_store();
    if store.find(&args.name)?.is_some() {
        return Err(CliError::Records(RecordStoreError::Duplicate {
            name: args.name,
        }));
    }

    let record = ServerRecord {
        identity: ServerIdentity::Manual(format!("manual-{}", Uuid::new_v4())),
        name: args.name,
        provider: args.provider,
        ip: args.ip,
        region: args.region,
        size: args.size,
        created_at: Utc::now(),
        mode: server_mode(args.mode),
    };
    store.save(&record)?;
    writeln!(io::stdout(), "registered {} at {}", record.name, record.ip)?;
    Ok(0)
}

fn servers_command() -> Result<i32, CliError> {
    let store = record_store();
    let records = store.load_all()?;
    render_server_listing(io::stdout(), &records)?;
    Ok(0)
}

fn backup_engine() -> Result<BackupEngine<TokioProcessRunner>, CliError> {
    let ssh = ChannelConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let config = BackupConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(BackupEngine::with_process_runner(ssh, &config)?)
}

/// Records live at `~/.varta/servers.json` unless `VARTA_RECORDS_PATH`
/// points elsewhere.
fn record_store() -> JsonRecordStore {
    env::var("VARTA_RECORDS_PATH").ok().map_or_else(
        JsonRecordStore::at_default_path,
        |path| JsonRecordStore::new(Utf8PathBuf::from(path)),
    )
}

fn load_record(store: &JsonRecordStore, name: &str) -> Result<ServerRecord, CliError> {
    store
        .find(name)?
        .ok_or_else(|| CliError::UnknownServer(String::from(name)))
}

const fn server_mode(mode: ModeArg) -> ServerMode {
    match mode {
        ModeArg::Managed => ServerMode::Managed,
        ModeArg::Bare => ServerMode::Bare,
    }
}

fn exit_code_for(steps: &[StepResult]) -> i32 {
    if overall_success(steps) { 0 } else { 1 }
}

fn render_steps(mut target: impl Write, steps: &[StepResult]) -> io::Result<()> {
    for step in steps {
        let marker = match step.outcome {
            StepOutcome::Success => "ok",
            StepOutcome::Failure => "failed",
            StepOutcome::Skipped => "skipped",
        };
        write!(target, "{:<17} {marker}", step.name)?;
        if let Some(detail) = &step.detail {
            write!(target, "  {detail}")?;
        }
        if let Some(error) = &step.error {
            write!(target, "  {error}")?;
        }
        writeln!(target)?;
        if let Some(hint) = &step.hint {
            writeln!(target, "{:<17} hint: {hint}", "")?;
        }
    }
    Ok(())
}

fn render_backup_listing(
    mut target: impl Write,
    server: &str,
    manifests: &[BackupManifest],
) -> io::Result<()> {
    if manifests.is_empty() {
        return writeln!(target, "no backups for {server}");
    }
    for manifest in manifests {
        writeln!(
            target,
            "{}  {}  platform {}  {} file(s)",
            manifest.timestamp,
            manifest.effective_mode().as_str(),
            manifest.platform_version,
            manifest.files.len(),
        )?;
    }
    Ok(())
}

fn render_orphan_listing(mut target: impl Write, orphans: &[String]) -> io::Result<()> {
    if orphans.is_empty() {
        return writeln!(target, "no orphaned backup directories");
    }
    for name in orphans {
        writeln!(target, "{name}")?;
    }
    Ok(())
}

fn render_server_listing(mut target: impl Write, records: &[ServerRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(target, "no servers registered");
    }
    for record in records {
        writeln!(
            target,
            "{:<20} {:<15} {:<12} {:<10} {:<14} {}",
            record.name,
            record.ip,
            record.provider,
            record.region,
            record.size,
            record.mode.as_str(),
        )?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
