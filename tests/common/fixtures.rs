//! Shared fixtures for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file
//! in `tests/`). Placing shared helpers under `tests/common/` avoids creating
//! an additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/fixtures.rs"]
//! mod fixtures;
//! ```

use std::os::unix::fs::PermissionsExt;

use camino::Utf8PathBuf;
use chrono::Utc;
use tempfile::TempDir;
use varta::{ChannelConfig, ServerIdentity, ServerMode, ServerRecord};

/// Channel configuration pointing at the given client binaries.
///
/// `true` stands in for ssh-keygen so host-key drops always succeed.
pub fn channel_config(ssh_bin: &str, scp_bin: &str) -> ChannelConfig {
    ChannelConfig {
        ssh_bin: String::from(ssh_bin),
        scp_bin: String::from(scp_bin),
        keygen_bin: String::from("true"),
        ssh_user: String::from("root"),
        connect_timeout_secs: 5,
    }
}

/// A manually registered record reachable at localhost.
pub fn manual_record(name: &str, mode: ServerMode) -> ServerRecord {
    ServerRecord {
        identity: ServerIdentity::Manual(String::from("manual-fixture")),
        name: String::from(name),
        provider: String::from("hetzner"),
        ip: String::from("127.0.0.1"),
        region: String::from("fsn1"),
        size: String::from("cx22"),
        created_at: Utc::now(),
        mode,
    }
}

/// Writes an executable shell script into the temp directory.
pub fn write_script(tmp: &TempDir, name: &str, body: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(tmp.path().join(name))
        .unwrap_or_else(|err| panic!("script path should be utf8: {}", err.display()));
    std::fs::write(&path, body).unwrap_or_else(|err| panic!("write script: {err}"));
    let mut perms = std::fs::metadata(&path)
        .unwrap_or_else(|err| panic!("script metadata: {err}"))
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap_or_else(|err| panic!("chmod script: {err}"));
    path
}
