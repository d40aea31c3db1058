//! Remote command lines issued by the backup and restore sequences.
//!
//! Commands are plain shell lines executed through the channel. Staging
//! paths are shell-escaped before being rendered; every other element is a
//! fixed string, so nothing caller-controlled reaches the remote shell.

use shell_escape::unix::escape;

/// Database dump artifact name.
pub(crate) const DATABASE_ARTIFACT: &str = "database.sql.gz";

/// Managed configuration archive name.
pub(crate) const CONFIG_ARTIFACT: &str = "config.tar.gz";

/// Bare-mode system configuration archive name.
pub(crate) const SYSTEM_ARTIFACT: &str = "system-config.tar.gz";

/// System paths captured by a bare-mode backup.
pub(crate) const BARE_CONFIG_PATHS: [&str; 5] = [
    "/etc/ssh/sshd_config",
    "/etc/ufw",
    "/etc/fail2ban",
    "/var/spool/cron",
    "/etc/apt/apt.conf.d/50unattended-upgrades",
];

/// Prints the installed platform version.
pub(crate) const VERSION_COMMAND: &str = "cat /opt/platform/.version";

/// Stops every service of the platform stack.
pub(crate) const STOP_STACK_COMMAND: &str = "cd /opt/platform && docker compose stop";

/// Starts only the database service.
pub(crate) const START_DATABASE_COMMAND: &str = "cd /opt/platform && docker compose up -d db";

/// Starts the full platform stack; also the restore rollback command.
pub(crate) const START_STACK_COMMAND: &str = "cd /opt/platform && docker compose up -d";

/// Dumps the platform database through gzip into `stage`.
///
/// `pipefail` keeps a failed dump from being masked by gzip's exit code.
pub(crate) fn dump_database_command(stage: &str) -> String {
    let out = escape(stage.into());
    format!(
        "set -o pipefail; cd /opt/platform && docker compose exec -T db pg_dump -U postgres app | gzip > {out}"
    )
}

/// Archives the platform configuration, including the optional `.env`.
pub(crate) fn archive_config_command(stage: &str) -> String {
    let out = escape(stage.into());
    format!("cd /opt/platform && tar czf {out} docker-compose.yml .env config")
}

/// Fallback archive used when `.env` is absent.
pub(crate) fn archive_config_fallback_command(stage: &str) -> String {
    let out = escape(stage.into());
    format!("cd /opt/platform && tar czf {out} docker-compose.yml config")
}

/// Archives the bare-mode system configuration paths.
///
/// `--ignore-failed-read` keeps a missing optional path (no ufw, no
/// fail2ban) from failing the whole archive.
pub(crate) fn archive_system_command(stage: &str) -> String {
    let out = escape(stage.into());
    let paths = BARE_CONFIG_PATHS.join(" ");
    format!("tar czf {out} --ignore-failed-read {paths}")
}

/// Replays the uploaded dump into the database service.
pub(crate) fn restore_database_command(stage: &str) -> String {
    let dump = escape(stage.into());
    format!(
        "set -o pipefail; cd /opt/platform && gunzip -c {dump} | docker compose exec -T db psql -U postgres app"
    )
}

/// Unpacks the uploaded configuration archive into the platform directory.
pub(crate) fn extract_config_command(stage: &str) -> String {
    let archive = escape(stage.into());
    format!("cd /opt/platform && tar xzf {archive}")
}

/// Unpacks the uploaded system archive at the filesystem root.
pub(crate) fn extract_system_command(stage: &str) -> String {
    let archive = escape(stage.into());
    format!("tar xzf {archive} -C /")
}

/// Removes staged files left on the remote host.
pub(crate) fn cleanup_command(paths: &[String]) -> String {
    let escaped: Vec<String> = paths
        .iter()
        .map(|path| escape(path.as_str().into()).into_owned())
        .collect();
    format!("rm -f {}", escaped.join(" "))
}
