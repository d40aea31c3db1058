//! JSON file persistence for server records.
//!
//! The store keeps the whole fleet in one JSON array and rewrites the file
//! on every mutation via a temp-file rename, which is plenty for the
//! handful of servers the orchestrator manages and keeps the file trivially
//! inspectable by hand.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

use crate::record::{RecordStore, RecordStoreError, ServerRecord};
use crate::util::expand_tilde;

const DEFAULT_RECORDS_PATH: &str = "~/.varta/servers.json";

/// Whole-file JSON array store for [`ServerRecord`]s.
#[derive(Clone, Debug)]
pub struct JsonRecordStore {
    path: Utf8PathBuf,
}

impl JsonRecordStore {
    /// Creates a store backed by the given file path.
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    /// Creates a store at the conventional location, `~/.varta/servers.json`.
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(Utf8PathBuf::from(expand_tilde(DEFAULT_RECORDS_PATH)))
    }

    /// Returns the backing file path.
    #[must_use]
    pub const fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    fn split_path(&self) -> Result<(&Utf8Path, &str), RecordStoreError> {
        let parent = self.path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| RecordStoreError::Io {
                path: self.path.clone(),
                message: String::from("record store path is missing a filename"),
            })?;
        Ok((parent, file_name))
    }

    fn write_all(&self, records: &[ServerRecord]) -> Result<(), RecordStoreError> {
        let (parent, file_name) = self.split_path()?;
        Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
            RecordStoreError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let dir = open_parent(parent)?;

        let rendered =
            serde_json::to_string_pretty(records).map_err(|err| RecordStoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        // Rewrite through a sibling temp file so readers never see a
        // half-written array.
        let staged = format!("{file_name}.tmp");
        dir.write(&staged, rendered)
            .and_then(|()| dir.rename(&staged, &dir, file_name))
            .map_err(|err| RecordStoreError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }
}

impl RecordStore for JsonRecordStore {
    fn load_all(&self) -> Result<Vec<ServerRecord>, RecordStoreError> {
        let (parent, file_name) = self.split_path()?;
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(RecordStoreError::Io {
                    path: parent.to_path_buf(),
                    message: err.to_string(),
                });
            }
        };

        let exists = dir.try_exists(file_name).map_err(|err| RecordStoreError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        if !exists {
            return Ok(Vec::new());
        }

        let contents = dir
            .read_to_string(file_name)
            .map_err(|err| RecordStoreError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|err| RecordStoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn save(&self, record: &ServerRecord) -> Result<(), RecordStoreError> {
        let mut records = self.load_all()?;
        if let Some(existing) = records.iter_mut().find(|entry| entry.name == record.name) {
            *existing = record.clone();
        } else {
            records.push(record.clone());
        }
        self.write_all(&records)
    }

    fn remove(&self, name: &str) -> Result<bool, RecordStoreError> {
        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|entry| entry.name != name);
        if records.len() == before {
            return Ok(false);
        }
        self.write_all(&records)?;
        Ok(true)
    }
}

fn open_parent(parent: &Utf8Path) -> Result<Dir, RecordStoreError> {
    Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| RecordStoreError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })
}
