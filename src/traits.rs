//! Collaborators the [FilamentTracker](crate::FilamentTracker) relies on to
//! get hold of project archives and to account for consumed filament, and the
//! lookup [SpoolSwitch](crate::SpoolSwitch) assigns tagged spools with.

use std::{collections::BTreeMap, convert::Infallible, fmt::Debug, future::Future};

use crate::ArchiveFile;

/// Identifier of a physical tray. AMS trays are numbered `ams_id * 4 + slot`,
/// the external spool holder is [EXTERNAL_SPOOL_TRAY](crate::EXTERNAL_SPOOL_TRAY).
pub type TrayId = u32;

/// Identifier of an inventory record, i.e. one physical spool.
pub type SpoolId = i64;

/// Something that can turn the model reference of a print start into an
/// archive on the local filesystem.
pub trait ModelProvider {
    /// Error type returned by this trait.
    type Error: Debug;

    /// Make the archive referenced by `url` available locally.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<ArchiveFile, Self::Error>>;
}

/// The filament inventory consumption is accounted against.
pub trait Inventory {
    /// Error type returned by this trait.
    type Error: Debug;

    /// Inventory record describing a spool.
    type Record;

    /// Take `length_mm` millimeters of filament from `spool`.
    fn consume(&self, spool: SpoolId, length_mm: f64) -> impl Future<Output = Result<(), Self::Error>>;

    /// Look a spool up, `None` if the inventory does not know it.
    fn lookup(&self, spool: SpoolId) -> impl Future<Output = Result<Option<Self::Record>, Self::Error>>;
}

/// Read-only assignment of spools to trays.
pub trait TrayConfiguration {
    /// Error type returned by this trait.
    type Error: Debug;

    /// The spool loaded in `tray`, if one has been assigned.
    fn spool_for_tray(&self, tray: TrayId) -> Result<Option<SpoolId>, Self::Error>;
}

impl TrayConfiguration for BTreeMap<TrayId, SpoolId> {
    type Error = Infallible;

    fn spool_for_tray(&self, tray: TrayId) -> Result<Option<SpoolId>, Infallible> {
        Ok(self.get(&tray).copied())
    }
}

/// Resolves the tag an AMS reads off a spool to the inventory record of that
/// spool.
pub trait SpoolDirectory {
    /// Error type returned by this trait.
    type Error: Debug;

    /// The spool carrying `tag`, `None` if no spool is registered with it.
    fn spool_for_tag(&self, tag: &str) -> impl Future<Output = Result<Option<SpoolId>, Self::Error>>;
}

impl SpoolDirectory for BTreeMap<String, SpoolId> {
    type Error = Infallible;

    async fn spool_for_tag(&self, tag: &str) -> Result<Option<SpoolId>, Infallible> {
        Ok(self.get(tag).copied())
    }
}
