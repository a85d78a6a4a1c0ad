//! Durable record of the print in flight, used to pick tracking back up
//! after the process restarts in the middle of a print.
//!
//! The store is a directory holding `metadata.json` and a copy of the
//! project archive as `model.3mf`. Both are written to a temporary sibling
//! first and renamed into place.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TrayId, EXTERNAL_SPOOL_TRAY};

const METADATA_FILE: &str = "metadata.json";
const MODEL_FILE: &str = "model.3mf";

/// Failure to write or update the checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Filesystem operation failed.
    #[error("checkpoint io on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored metadata could not be parsed.
    #[error("malformed checkpoint metadata {}: {source}", path.display())]
    Malformed {
        /// Metadata file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Metadata could not be encoded.
    #[error("failed to encode checkpoint metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Which print a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, parse_display::Display)]
#[display("{task_id}/{subtask_id}")]
pub struct TaskIdentity {
    /// Task identifier reported by the printer.
    pub task_id: String,
    /// Sub-task identifier reported by the printer.
    pub subtask_id: String,
}

impl TaskIdentity {
    /// Create a new identity.
    pub fn new(task_id: impl Into<String>, subtask_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            subtask_id: subtask_id.into(),
        }
    }
}

/// Maps the filament slots used in the gcode to physical trays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "trays", rename_all = "snake_case")]
pub enum SlotMapping {
    /// Slot `n` is fed from tray `trays[n]`. Negative entries are slots the
    /// printer did not map.
    Feeder(Vec<i64>),
    /// Every slot is fed from the external spool holder.
    ExternalSpool,
}

impl SlotMapping {
    /// Mapping for a print started with or without the AMS.
    pub fn for_print(use_ams: bool, ams_mapping: Option<&[i64]>) -> Self {
        if use_ams {
            SlotMapping::Feeder(ams_mapping.map(<[i64]>::to_vec).unwrap_or_default())
        } else {
            SlotMapping::ExternalSpool
        }
    }

    /// The tray feeding `slot`, `None` when the slot is not mapped.
    pub fn tray_for(&self, slot: u32) -> Option<TrayId> {
        match self {
            SlotMapping::Feeder(trays) => {
                let tray = *trays.get(usize::try_from(slot).ok()?)?;
                TrayId::try_from(tray).ok()
            }
            SlotMapping::ExternalSpool => Some(EXTERNAL_SPOOL_TRAY),
        }
    }

    /// Whether filament is fed by the AMS.
    pub fn uses_feeder(&self) -> bool {
        matches!(self, SlotMapping::Feeder(_))
    }
}

/// A checkpoint read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Print the checkpoint was written for.
    pub identity: TaskIdentity,
    /// Last layer whose usage was consumed.
    pub current_layer: u32,
    /// Slot to tray mapping of the print.
    pub slot_mapping: SlotMapping,
    /// Name of the gcode stream inside the archive.
    pub gcode_file: String,
    /// Copy of the project archive.
    pub archive: PathBuf,
    /// When the checkpoint was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Metadata {
    task_id: Option<String>,
    subtask_id: Option<String>,
    current_layer: Option<u32>,
    slot_mapping: Option<SlotMapping>,
    gcode_file_name: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Directory backed store for the checkpoint of a single print.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    directory: PathBuf,
}

impl CheckpointStore {
    /// Use `directory` for the checkpoint. It is created on first save.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Return the checkpoint directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn metadata_path(&self) -> PathBuf {
        self.directory.join(METADATA_FILE)
    }

    fn model_path(&self) -> PathBuf {
        self.directory.join(MODEL_FILE)
    }

    /// Record the start of a print, replacing whatever was stored before.
    pub fn save(
        &self,
        identity: &TaskIdentity,
        current_layer: u32,
        slot_mapping: &SlotMapping,
        gcode_file: &str,
        archive: &Path,
    ) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.directory).map_err(io_error(&self.directory))?;

        // Metadata of a previous print must not outlive its archive.
        let metadata = self.metadata_path();
        match fs::remove_file(&metadata) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&metadata)(err)),
        }

        let model = self.model_path();
        let staged = model.with_extension("3mf.tmp");
        fs::copy(archive, &staged).map_err(io_error(archive))?;
        fs::rename(&staged, &model).map_err(io_error(&model))?;

        self.write_metadata(&Metadata {
            task_id: Some(identity.task_id.clone()),
            subtask_id: Some(identity.subtask_id.clone()),
            current_layer: Some(current_layer),
            slot_mapping: Some(slot_mapping.clone()),
            gcode_file_name: Some(gcode_file.to_owned()),
            updated_at: Some(Utc::now()),
        })?;

        tracing::debug!(identity = identity.to_string(), current_layer, "checkpoint saved");
        Ok(())
    }

    /// Move the stored position to `layer`. Returns `false` when there is no
    /// checkpoint to advance.
    pub fn advance(&self, layer: u32) -> Result<bool, CheckpointError> {
        let Some(mut metadata) = self.read_metadata()? else {
            tracing::debug!(layer, "no checkpoint to advance");
            return Ok(false);
        };

        metadata.current_layer = Some(layer);
        metadata.updated_at = Some(Utc::now());
        self.write_metadata(&metadata)?;

        tracing::trace!(layer, "checkpoint advanced");
        Ok(true)
    }

    /// Read the checkpoint back if it is complete and was written for
    /// `identity`.
    pub fn recover(&self, identity: &TaskIdentity) -> Option<Checkpoint> {
        let metadata = match self.read_metadata() {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                tracing::debug!("no checkpoint to recover");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = format!("{:?}", e), "unreadable checkpoint");
                return None;
            }
        };

        let (Some(task_id), Some(subtask_id), Some(current_layer), Some(slot_mapping), Some(gcode_file)) = (
            metadata.task_id,
            metadata.subtask_id,
            metadata.current_layer,
            metadata.slot_mapping,
            metadata.gcode_file_name,
        ) else {
            tracing::warn!("incomplete checkpoint metadata");
            return None;
        };

        let stored = TaskIdentity { task_id, subtask_id };
        if &stored != identity {
            tracing::info!(
                stored = stored.to_string(),
                current = identity.to_string(),
                "checkpoint belongs to another print"
            );
            return None;
        }

        let archive = self.model_path();
        if !archive.is_file() {
            tracing::warn!(path = format!("{:?}", archive), "checkpoint archive missing");
            return None;
        }

        Some(Checkpoint {
            identity: stored,
            current_layer,
            slot_mapping,
            gcode_file,
            archive,
            updated_at: metadata.updated_at,
        })
    }

    /// Remove the checkpoint. Removing a missing checkpoint is not an error.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_dir_all(&self.directory) {
            Ok(()) => {
                tracing::debug!(path = format!("{:?}", self.directory), "checkpoint cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.directory)(err)),
        }
    }

    fn read_metadata(&self) -> Result<Option<Metadata>, CheckpointError> {
        let path = self.metadata_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path)(err)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| CheckpointError::Malformed { path, source })
    }

    fn write_metadata(&self, metadata: &Metadata) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(metadata)?;
        let path = self.metadata_path();
        let staged = path.with_extension("json.tmp");

        let _ = fs::remove_file(&staged);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .map_err(io_error(&staged))?;
        file.write_all(json.as_bytes()).map_err(io_error(&staged))?;
        file.sync_all().map_err(io_error(&staged))?;

        fs::rename(&staged, &path).map_err(io_error(&path))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    use super::*;

    fn identity() -> TaskIdentity {
        TaskIdentity::new("108421734", "108421735")
    }

    fn store_with_archive() -> std::io::Result<(tempfile::TempDir, CheckpointStore, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("download.3mf");
        fs::write(&archive, b"archive bytes")?;
        let store = CheckpointStore::new(dir.path().join("checkpoint"));
        Ok((dir, store, archive))
    }

    #[test]
    fn test_save_and_recover() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        let mapping = SlotMapping::Feeder(vec![0, 2]);

        store.save(&identity(), 0, &mapping, "Metadata/plate_1.gcode", &archive)?;
        let checkpoint = store.recover(&identity()).unwrap();

        assert_eq!(checkpoint.identity, identity());
        assert_eq!(checkpoint.current_layer, 0);
        assert_eq!(checkpoint.slot_mapping, mapping);
        assert_eq!(checkpoint.gcode_file, "Metadata/plate_1.gcode");
        assert_eq!(fs::read(&checkpoint.archive)?, b"archive bytes");
        assert!(checkpoint.updated_at.is_some());
        Ok(())
    }

    #[test]
    fn test_save_overwrites() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 12, &SlotMapping::ExternalSpool, "a.gcode", &archive)?;

        let other = TaskIdentity::new("1", "2");
        store.save(&other, 0, &SlotMapping::Feeder(vec![3]), "b.gcode", &archive)?;

        assert_eq!(store.recover(&identity()), None);
        let checkpoint = store.recover(&other).unwrap();
        assert_eq!(checkpoint.current_layer, 0);
        assert_eq!(checkpoint.gcode_file, "b.gcode");
        Ok(())
    }

    #[test]
    fn test_failed_save_leaves_no_stale_metadata() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 12, &SlotMapping::ExternalSpool, "a.gcode", &archive)?;

        // A directory in the way of the staged metadata makes the write fail.
        fs::create_dir(store.directory().join("metadata.json.tmp"))?;
        let other = TaskIdentity::new("1", "2");
        let result = store.save(&other, 0, &SlotMapping::Feeder(vec![3]), "b.gcode", &archive);

        assert!(matches!(result, Err(CheckpointError::Io { .. })), "{:?}", result);
        assert_eq!(store.recover(&identity()), None);
        assert_eq!(store.recover(&other), None);
        assert!(!store.advance(13)?);
        Ok(())
    }

    #[test]
    fn test_advance_keeps_archive() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 0, &SlotMapping::ExternalSpool, "plate.gcode", &archive)?;
        fs::remove_file(&archive)?;

        assert!(store.advance(7)?);

        let checkpoint = store.recover(&identity()).unwrap();
        assert_eq!(checkpoint.current_layer, 7);
        assert_eq!(checkpoint.slot_mapping, SlotMapping::ExternalSpool);
        assert_eq!(fs::read(&checkpoint.archive)?, b"archive bytes");
        Ok(())
    }

    #[test]
    fn test_advance_without_checkpoint() -> TestResult {
        let (_dir, store, _archive) = store_with_archive()?;

        assert!(!store.advance(3)?);
        assert!(!store.directory().exists());
        Ok(())
    }

    #[test]
    fn test_recover_identity_mismatch() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 4, &SlotMapping::ExternalSpool, "plate.gcode", &archive)?;

        assert_eq!(store.recover(&TaskIdentity::new("108421734", "0")), None);
        assert_eq!(store.recover(&TaskIdentity::new("0", "108421735")), None);
        Ok(())
    }

    #[test]
    fn test_recover_missing_archive() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 4, &SlotMapping::ExternalSpool, "plate.gcode", &archive)?;
        fs::remove_file(store.directory().join(MODEL_FILE))?;

        assert_eq!(store.recover(&identity()), None);
        Ok(())
    }

    #[test]
    fn test_recover_incomplete_metadata() -> TestResult {
        let (_dir, store, _archive) = store_with_archive()?;
        fs::create_dir_all(store.directory())?;
        fs::write(store.directory().join(MODEL_FILE), b"archive bytes")?;
        fs::write(
            store.directory().join(METADATA_FILE),
            r#"{"task_id": "108421734", "subtask_id": "108421735", "current_layer": 3}"#,
        )?;

        assert_eq!(store.recover(&identity()), None);
        Ok(())
    }

    #[test]
    fn test_recover_malformed_metadata() -> TestResult {
        let (_dir, store, _archive) = store_with_archive()?;
        fs::create_dir_all(store.directory())?;
        fs::write(store.directory().join(MODEL_FILE), b"archive bytes")?;
        fs::write(store.directory().join(METADATA_FILE), "{\"task_id\": ")?;

        assert_eq!(store.recover(&identity()), None);
        assert!(matches!(store.advance(1), Err(CheckpointError::Malformed { .. })));
        Ok(())
    }

    #[test]
    fn test_clear_is_idempotent() -> TestResult {
        let (_dir, store, archive) = store_with_archive()?;
        store.save(&identity(), 0, &SlotMapping::ExternalSpool, "plate.gcode", &archive)?;

        store.clear()?;
        assert!(!store.directory().exists());
        store.clear()?;
        assert_eq!(store.recover(&identity()), None);
        Ok(())
    }

    #[test]
    fn test_slot_mapping() {
        let feeder = SlotMapping::for_print(true, Some(&[0, -1, 6]));
        assert!(feeder.uses_feeder());
        assert_eq!(feeder.tray_for(0), Some(0));
        assert_eq!(feeder.tray_for(1), None);
        assert_eq!(feeder.tray_for(2), Some(6));
        assert_eq!(feeder.tray_for(3), None);

        let external = SlotMapping::for_print(false, Some(&[0, 1]));
        assert!(!external.uses_feeder());
        assert_eq!(external.tray_for(0), Some(EXTERNAL_SPOOL_TRAY));
        assert_eq!(external.tray_for(9), Some(EXTERNAL_SPOOL_TRAY));

        assert_eq!(SlotMapping::for_print(true, None), SlotMapping::Feeder(vec![]));
    }

    #[test]
    fn test_slot_mapping_serialization() -> TestResult {
        assert_eq!(
            serde_json::to_string(&SlotMapping::Feeder(vec![0, 2]))?,
            r#"{"kind":"feeder","trays":[0,2]}"#
        );
        assert_eq!(
            serde_json::to_string(&SlotMapping::ExternalSpool)?,
            r#"{"kind":"external_spool"}"#
        );
        Ok(())
    }
}
