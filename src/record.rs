//! Server records describing the fleet under management.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel address stored while a vendor has not yet assigned a public IP.
pub const PENDING_IP: &str = "pending";

/// How a server entered the fleet.
///
/// Vendor identities carry the provider's server identifier and support
/// API-driven operations (status, reboot, snapshots). Manual identities were
/// registered by hand and are reached over SSH only.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ServerIdentity {
    /// Created through a cloud vendor API; the value is the vendor's ID.
    Vendor(String),
    /// Registered manually; the value is a locally generated token.
    Manual(String),
}

impl ServerIdentity {
    /// Returns `true` for manually registered servers.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }
}

/// Operating mode of a managed server.
///
/// The mode decides which backup artifacts exist, which update sequence
/// maintenance runs, and which bootstrap script provisioning installs. The
/// enum is closed; every consumer matches exhaustively so a new mode cannot
/// be introduced without visiting each decision point.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Runs the container platform stack under `/opt/platform`.
    Managed,
    /// Plain host with system-level configuration only.
    Bare,
}

impl ServerMode {
    /// Stable lowercase name used in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Bare => "bare",
        }
    }
}

/// One server known to the orchestrator.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// Identity of the server (vendor ID or manual token).
    pub identity: ServerIdentity,
    /// Unique human-chosen name; also names the backup namespace.
    pub name: String,
    /// Vendor the server lives at, for example `hetzner`.
    pub provider: String,
    /// Public IPv4 address, or [`PENDING_IP`] while unassigned.
    pub ip: String,
    /// Vendor region the server was placed in.
    pub region: String,
    /// Vendor size or plan identifier.
    pub size: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Operating mode.
    pub mode: ServerMode,
}

impl ServerRecord {
    /// Returns `true` while the vendor has not yet assigned an address.
    #[must_use]
    pub fn has_pending_ip(&self) -> bool {
        self.ip == PENDING_IP
    }
}

/// Errors raised by record persistence backends.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when stored content cannot be decoded.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a record with the same name already exists.
    #[error("server {name} is already registered")]
    Duplicate {
        /// Conflicting server name.
        name: String,
    },
}

/// Persistence seam for server records.
///
/// Engines receive a store by reference and never construct one; the shipped
/// implementation is [`crate::record_store::JsonRecordStore`].
pub trait RecordStore {
    /// Returns every stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the backing file cannot be read or
    /// decoded.
    fn load_all(&self) -> Result<Vec<ServerRecord>, RecordStoreError>;

    /// Inserts or replaces the record with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the backing file cannot be updated.
    fn save(&self, record: &ServerRecord) -> Result<(), RecordStoreError>;

    /// Looks up a record by server name.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the backing file cannot be read.
    fn find(&self, name: &str) -> Result<Option<ServerRecord>, RecordStoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|record| record.name == name))
    }

    /// Removes the record with the given name; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the backing file cannot be updated.
    fn remove(&self, name: &str) -> Result<bool, RecordStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> ServerRecord {
        ServerRecord {
            identity: ServerIdentity::Vendor(String::from("srv-1234")),
            name: String::from("web-01"),
            provider: String::from("hetzner"),
            ip: String::from("203.0.113.10"),
            region: String::from("fsn1"),
            size: String::from("cx22"),
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).single()
                .unwrap_or_else(|| panic!("fixed timestamp should be valid")),
            mode: ServerMode::Managed,
        }
    }

    #[test]
    fn records_serialize_camel_case() {
        let json = serde_json::to_value(sample_record())
            .unwrap_or_else(|err| panic!("serialize record: {err}"));
        assert_eq!(
            json.get("identity").and_then(|v| v.get("kind")),
            Some(&serde_json::Value::String(String::from("vendor")))
        );
        assert!(json.get("createdAt").is_some());
        assert_eq!(
            json.get("mode"),
            Some(&serde_json::Value::String(String::from("managed")))
        );
    }

    #[test]
    fn pending_ip_sentinel_is_detected() {
        let mut record = sample_record();
        assert!(!record.has_pending_ip());
        record.ip = String::from(PENDING_IP);
        assert!(record.has_pending_ip());
    }

    #[test]
    fn manual_identity_round_trips() {
        let mut record = sample_record();
        record.identity = ServerIdentity::Manual(String::from("local-1"));
        let json = serde_json::to_string(&record)
            .unwrap_or_else(|err| panic!("serialize record: {err}"));
        let parsed: ServerRecord = serde_json::from_str(&json)
            .unwrap_or_else(|err| panic!("parse record: {err}"));
        assert!(parsed.identity.is_manual());
    }
}
