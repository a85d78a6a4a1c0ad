#![allow(refining_impl_trait)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate tracks how much filament a Bambu Lab print consumes, layer by
//! layer, and reports it to a filament inventory as the print progresses.
//!
//! The gcode of the print is pulled out of its 3MF project archive
//! ([threemf]) and evaluated into per layer usage ([gcode]). A
//! [FilamentTracker] consumes that usage as the printer reports layer
//! changes, keeping a checkpoint ([checkpoint]) so that a restart in the
//! middle of a print neither loses nor double counts filament.
//!
//! Trays holding tagged spools can be assigned automatically by a
//! [SpoolSwitch].

pub mod checkpoint;
pub mod config;
mod file;
pub mod gcode;
mod inventory;
pub mod model;
pub mod settings;
pub mod spool_switch;
mod status;
pub mod threemf;
mod traits;
pub mod tracker;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, SlotMapping, TaskIdentity};
pub use config::Config;
pub use file::{ArchiveFile, TemporaryFile};
pub use inventory::{DryRunInventory, TagDirectory};
pub use model::{ModelError, ModelFetcher};
pub use settings::{SettingsError, SettingsFile};
pub use spool_switch::SpoolSwitch;
pub use status::PrinterStatus;
pub use threemf::{extract_gcode, ExtractError, ExtractedGcode};
pub use tracker::{Dispatcher, FilamentTracker, PrintSession, PrintStart, PrinterEvent};
pub use traits::{Inventory, ModelProvider, SpoolDirectory, SpoolId, TrayConfiguration, TrayId};

/// Tray id of the external spool holder.
pub const EXTERNAL_SPOOL_TRAY: TrayId = 254;
