//! Local backup directory layout.
//!
//! Backups live under `<root>/<server>/<timestamp-token>/`. Every path
//! component passes the traversal guard before any filesystem access, so a
//! hostile token such as `../../etc` can never resolve outside the store.

use std::io;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::Permissions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::debug;

use super::manifest::{BackupManifest, MANIFEST_FILE_NAME};

const DIR_MODE: u32 = 0o700;
const MANIFEST_MODE: u32 = 0o600;

/// Errors raised by the backup store.
#[derive(Debug, Error)]
pub enum BackupStoreError {
    /// Raised when a path component could escape the backup namespace.
    #[error("unsafe {what}: {value:?}")]
    Traversal {
        /// Which component failed the guard.
        what: &'static str,
        /// Offending value.
        value: String,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a manifest cannot be encoded for writing.
    #[error("failed to encode manifest for {path}: {message}")]
    Encode {
        /// Directory the manifest was meant for.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Filesystem store for backup directories and manifests.
#[derive(Clone, Debug)]
pub struct BackupStore {
    root: Utf8PathBuf,
}

impl BackupStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Returns the store's root directory.
    #[must_use]
    pub const fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    /// Resolves the directory for one backup, applying the traversal guard.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError::Traversal`] when either component is
    /// unsafe. No filesystem access happens here.
    pub fn backup_dir(&self, server: &str, token: &str) -> Result<Utf8PathBuf, BackupStoreError> {
        validate_component(server, "server name")?;
        validate_component(token, "backup timestamp")?;
        Ok(self.root.join(server).join(token))
    }

    /// Resolves one artifact path inside a backup directory.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError::Traversal`] when any component is unsafe.
    pub fn artifact_path(
        &self,
        server: &str,
        token: &str,
        file: &str,
    ) -> Result<Utf8PathBuf, BackupStoreError> {
        validate_component(file, "artifact name")?;
        Ok(self.backup_dir(server, token)?.join(file))
    }

    /// Creates the backup directory with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when validation or directory creation
    /// fails.
    pub fn create_backup_dir(
        &self,
        server: &str,
        token: &str,
    ) -> Result<Utf8PathBuf, BackupStoreError> {
        let path = self.backup_dir(server, token)?;
        Dir::create_ambient_dir_all(&self.root, ambient_authority()).map_err(|err| {
            BackupStoreError::Io {
                path: self.root.clone(),
                message: err.to_string(),
            }
        })?;
        let root_dir = self.open_root()?;
        let relative = format!("{server}/{token}");
        root_dir
            .create_dir_all(&relative)
            .and_then(|()| {
                root_dir.set_permissions(server, owner_only(DIR_MODE))?;
                root_dir.set_permissions(&relative, owner_only(DIR_MODE))
            })
            .map_err(|err| BackupStoreError::Io {
                path: path.clone(),
                message: err.to_string(),
            })?;
        Ok(path)
    }

    /// Writes the manifest into its backup directory with owner-only
    /// permissions.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when validation, encoding, or the write
    /// fails.
    pub fn write_manifest(&self, manifest: &BackupManifest) -> Result<(), BackupStoreError> {
        let dir_path = self.backup_dir(&manifest.server_name, &manifest.timestamp)?;
        let rendered =
            serde_json::to_string_pretty(manifest).map_err(|err| BackupStoreError::Encode {
                path: dir_path.clone(),
                message: err.to_string(),
            })?;
        let dir = open_dir(&dir_path)?;
        dir.write(MANIFEST_FILE_NAME, rendered)
            .and_then(|()| dir.set_permissions(MANIFEST_FILE_NAME, owner_only(MANIFEST_MODE)))
            .map_err(|err| BackupStoreError::Io {
                path: dir_path.join(MANIFEST_FILE_NAME),
                message: err.to_string(),
            })
    }

    /// Loads the manifest for one backup.
    ///
    /// Returns `Ok(None)` when the backup directory or manifest file is
    /// missing, and when the manifest content cannot be decoded; an invalid
    /// directory is treated as not being a backup at all.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when validation fails or the manifest
    /// exists but cannot be read.
    pub fn load_manifest(
        &self,
        server: &str,
        token: &str,
    ) -> Result<Option<BackupManifest>, BackupStoreError> {
        let dir_path = self.backup_dir(server, token)?;
        let Some(dir) = open_dir_if_present(&dir_path)? else {
            return Ok(None);
        };
        read_manifest_in(&dir, &dir_path)
    }

    /// Returns the artifact names listed in the manifest but absent on disk.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when validation or the existence checks
    /// fail.
    pub fn missing_artifacts(
        &self,
        manifest: &BackupManifest,
    ) -> Result<Vec<String>, BackupStoreError> {
        let dir_path = self.backup_dir(&manifest.server_name, &manifest.timestamp)?;
        let Some(dir) = open_dir_if_present(&dir_path)? else {
            return Ok(manifest.files.clone());
        };

        let mut missing = Vec::new();
        for file in &manifest.files {
            validate_component(file, "artifact name")?;
            let present = dir.try_exists(file).map_err(|err| BackupStoreError::Io {
                path: dir_path.join(file),
                message: err.to_string(),
            })?;
            if !present {
                missing.push(file.clone());
            }
        }
        Ok(missing)
    }

    /// Lists the backups recorded for one server, newest first.
    ///
    /// Directories without a readable manifest are not valid backups and are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when validation or directory reads fail.
    pub fn list_backups(&self, server: &str) -> Result<Vec<BackupManifest>, BackupStoreError> {
        validate_component(server, "server name")?;
        let server_path = self.root.join(server);
        let Some(dir) = open_dir_if_present(&server_path)? else {
            return Ok(Vec::new());
        };

        let mut manifests = Vec::new();
        for name in dir_entry_names(&dir, &server_path)? {
            let entry_path = server_path.join(&name);
            let Some(entry_dir) = open_dir_if_present(&entry_path)? else {
                continue;
            };
            if let Some(manifest) = read_manifest_in(&entry_dir, &entry_path)? {
                manifests.push(manifest);
            }
        }

        manifests.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(manifests)
    }

    /// Returns backup namespaces that no longer match an active server.
    ///
    /// Read-only and idempotent: scanning twice over an unchanged filesystem
    /// yields the same set.
    ///
    /// # Errors
    ///
    /// Returns [`BackupStoreError`] when directory reads fail.
    pub fn scan_orphans(&self, active_names: &[String]) -> Result<Vec<String>, BackupStoreError> {
        let Some(dir) = open_dir_if_present(&self.root)? else {
            return Ok(Vec::new());
        };

        let mut orphans: Vec<String> = dir_entry_names(&dir, &self.root)?
            .into_iter()
            .filter(|name| !active_names.iter().any(|active| active == name))
            .collect();
        orphans.sort_unstable();
        Ok(orphans)
    }

    fn open_root(&self) -> Result<Dir, BackupStoreError> {
        open_dir(&self.root)
    }
}

/// Rejects path components that could escape the backup namespace.
fn validate_component(value: &str, what: &'static str) -> Result<(), BackupStoreError> {
    let unsafe_component = value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..");
    if unsafe_component {
        return Err(BackupStoreError::Traversal {
            what,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn owner_only(mode: u32) -> Permissions {
    Permissions::from_std(std::fs::Permissions::from_mode(mode))
}

fn open_dir(path: &Utf8Path) -> Result<Dir, BackupStoreError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| BackupStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn open_dir_if_present(path: &Utf8Path) -> Result<Option<Dir>, BackupStoreError> {
    match Dir::open_ambient_dir(path, ambient_authority()) {
        Ok(dir) => Ok(Some(dir)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BackupStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn dir_entry_names(dir: &Dir, path: &Utf8Path) -> Result<Vec<String>, BackupStoreError> {
    let entries = dir.entries().map_err(|err| BackupStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let mut names = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|err| BackupStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let name = entry.file_name().map_err(|err| BackupStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        names.push(name);
    }
    Ok(names)
}

fn read_manifest_in(
    dir: &Dir,
    dir_path: &Utf8Path,
) -> Result<Option<BackupManifest>, BackupStoreError> {
    let exists = dir
        .try_exists(MANIFEST_FILE_NAME)
        .map_err(|err| BackupStoreError::Io {
            path: dir_path.join(MANIFEST_FILE_NAME),
            message: err.to_string(),
        })?;
    if !exists {
        return Ok(None);
    }

    let contents = dir
        .read_to_string(MANIFEST_FILE_NAME)
        .map_err(|err| BackupStoreError::Io {
            path: dir_path.join(MANIFEST_FILE_NAME),
            message: err.to_string(),
        })?;

    match serde_json::from_str(&contents) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(err) => {
            debug!(path = %dir_path, error = %err, "skipping unreadable manifest");
            Ok(None)
        }
    }
}
