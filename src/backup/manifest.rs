//! Backup manifests and the timestamp token naming backup directories.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ServerMode;

/// File name of the manifest inside each backup directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Version placeholder recorded when managed-mode version capture fails.
pub const VERSION_UNKNOWN: &str = "unknown";

/// Version sentinel recorded for bare-mode backups.
pub const VERSION_BARE: &str = "n/a";

/// Manifest written as the final step of a successful backup.
///
/// A backup directory without a readable manifest is not a valid backup;
/// listings skip it and restore refuses it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    /// Name of the server the backup was taken from.
    pub server_name: String,
    /// Vendor the server lives at.
    pub provider: String,
    /// Timestamp token, equal to the directory name.
    pub timestamp: String,
    /// Captured platform version, [`VERSION_UNKNOWN`], or [`VERSION_BARE`].
    pub platform_version: String,
    /// Artifact file names in the order they were captured.
    pub files: Vec<String>,
    /// Mode tag. Managed-mode manifests written by older builds omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServerMode>,
}

impl BackupManifest {
    /// Mode the backup was taken in. A missing tag means managed: early
    /// manifests predate bare mode and could only describe managed servers.
    #[must_use]
    pub fn effective_mode(&self) -> ServerMode {
        self.mode.unwrap_or(ServerMode::Managed)
    }
}

/// Renders an instant as a filesystem-safe directory token.
///
/// RFC 3339 UTC with `:` and `.` replaced by `-` and the trailing `Z`
/// stripped, for example `2026-03-14T09-26-53`.
#[must_use]
pub fn timestamp_token(instant: DateTime<Utc>) -> String {
    let rendered = instant.to_rfc3339_opts(SecondsFormat::Secs, true);
    let safe: String = rendered
        .chars()
        .map(|ch| if ch == ':' || ch == '.' { '-' } else { ch })
        .collect();
    safe.trim_end_matches('Z').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_is_filesystem_safe() {
        let instant = Utc
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .unwrap_or_else(|| panic!("fixed timestamp should be valid"));
        assert_eq!(timestamp_token(instant), "2026-03-14T09-26-53");
    }

    #[test]
    fn manifest_serializes_camel_case_without_managed_mode_tag() {
        let manifest = BackupManifest {
            server_name: String::from("web-01"),
            provider: String::from("hetzner"),
            timestamp: String::from("2026-03-14T09-26-53"),
            platform_version: String::from("2.4.1"),
            files: vec![
                String::from("database.sql.gz"),
                String::from("config.tar.gz"),
            ],
            mode: None,
        };
        let json = serde_json::to_value(&manifest)
            .unwrap_or_else(|err| panic!("serialize manifest: {err}"));
        assert!(json.get("serverName").is_some());
        assert!(json.get("platformVersion").is_some());
        assert!(json.get("mode").is_none(), "managed tag stays implicit");
    }

    #[test]
    fn missing_mode_reads_as_managed() {
        let json = r#"{
            "serverName": "web-01",
            "provider": "hetzner",
            "timestamp": "2026-03-14T09-26-53",
            "platformVersion": "2.4.1",
            "files": ["database.sql.gz", "config.tar.gz"]
        }"#;
        let manifest: BackupManifest =
            serde_json::from_str(json).unwrap_or_else(|err| panic!("parse manifest: {err}"));
        assert_eq!(manifest.effective_mode(), ServerMode::Managed);
    }

    #[test]
    fn bare_mode_round_trips() {
        let manifest = BackupManifest {
            server_name: String::from("edge-01"),
            provider: String::from("vultr"),
            timestamp: String::from("2026-03-14T09-26-53"),
            platform_version: String::from(VERSION_BARE),
            files: vec![String::from("system-config.tar.gz")],
            mode: Some(ServerMode::Bare),
        };
        let json = serde_json::to_string(&manifest)
            .unwrap_or_else(|err| panic!("serialize manifest: {err}"));
        assert!(json.contains(r#""mode":"bare""#));
        let parsed: BackupManifest =
            serde_json::from_str(&json).unwrap_or_else(|err| panic!("parse manifest: {err}"));
        assert_eq!(parsed.effective_mode(), ServerMode::Bare);
    }
}
