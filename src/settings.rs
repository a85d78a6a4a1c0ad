//! Tray to spool assignments kept in a JSON settings file.
//!
//! ```json
//! { "trays": { "0": 12, "254": 3 }, "locked_trays": [0] }
//! ```
//!
//! Keys this crate does not know about are kept when the file is written
//! back.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SpoolId, TrayConfiguration, TrayId};

/// Failure to read or write the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings JSON.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> SettingsError + '_ {
    move |source| SettingsError::Write {
        path: path.to_owned(),
        source,
    }
}

/// Contents of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Spool loaded in each tray, keyed by the tray id as a string.
    #[serde(default)]
    pub trays: BTreeMap<String, SpoolId>,
    /// Trays whose assignment was made from the spool tag the AMS read.
    #[serde(default)]
    pub locked_trays: Vec<TrayId>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl Settings {
    /// The spool assigned to `tray`.
    pub fn spool_for_tray(&self, tray: TrayId) -> Option<SpoolId> {
        self.trays.get(&tray.to_string()).copied()
    }

    /// Whether the assignment of `tray` is locked.
    pub fn is_locked(&self, tray: TrayId) -> bool {
        self.locked_trays.contains(&tray)
    }

    /// Assign `spool` to `tray` and lock the assignment. Returns whether
    /// anything changed.
    pub fn lock_tray(&mut self, tray: TrayId, spool: SpoolId) -> bool {
        let previous = self.trays.insert(tray.to_string(), spool);
        if self.is_locked(tray) {
            return previous != Some(spool);
        }
        self.locked_trays.push(tray);
        true
    }

    /// Unlock `tray`, dropping its assignment as well when `clear` is set.
    /// Trays that are not locked are left alone. Returns whether anything
    /// changed.
    pub fn unlock_tray(&mut self, tray: TrayId, clear: bool) -> bool {
        let Some(position) = self.locked_trays.iter().position(|t| *t == tray) else {
            return false;
        };
        self.locked_trays.remove(position);
        if clear {
            self.trays.remove(&tray.to_string());
        }
        true
    }
}

/// A settings file on disk, read again on every lookup so that edits made
/// while a print is running apply to the next layer.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    /// Use the settings file at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the path on the filesystem.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current settings. A missing file means no assignments.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = format!("{:?}", self.path), "no settings file");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file with `settings`. The new contents are written to a
    /// temporary sibling and renamed into place.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(settings).map_err(|e| write_error(&self.path)(e.into()))?;
        let staged = self.path.with_extension("json.tmp");

        let _ = fs::remove_file(&staged);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .map_err(write_error(&staged))?;
        file.write_all(json.as_bytes()).map_err(write_error(&staged))?;
        file.sync_all().map_err(write_error(&staged))?;

        fs::rename(&staged, &self.path).map_err(write_error(&self.path))
    }

    /// Load the settings, apply `change` and write them back if it reports a
    /// modification. Returns whether the file was written.
    pub fn update(&self, change: impl FnOnce(&mut Settings) -> bool) -> Result<bool, SettingsError> {
        let mut settings = self.load()?;
        if !change(&mut settings) {
            return Ok(false);
        }
        self.save(&settings)?;
        Ok(true)
    }
}

impl TrayConfiguration for SettingsFile {
    type Error = SettingsError;

    fn spool_for_tray(&self, tray: TrayId) -> Result<Option<SpoolId>, SettingsError> {
        Ok(self.load()?.spool_for_tray(tray))
    }
}
