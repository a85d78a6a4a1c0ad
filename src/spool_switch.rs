//! Automatic tray assignment from the spool tags the AMS reads.
//!
//! Bambu Lab spools carry an RFID tag which the AMS reports as the
//! `tray_uuid` of the tray holding the spool. When that tag is registered
//! with a spool in the inventory, the tray is assigned the spool and the
//! assignment is locked. Taking the spool out unlocks the tray again and
//! drops the assignment.

use std::collections::BTreeMap;

use bambulabs::message::{PrintTray, PushStatus};

use crate::{SettingsFile, SpoolDirectory, TrayId};

/// Tag reported for a tray whose spool has no readable tag.
const UNKNOWN_TAG: &str = "00000000000000000000000000000000";

/// Keeps the tray assignments of a [SettingsFile] in line with the spool
/// tags reported by the AMS.
///
/// The tags seen so far are remembered for the lifetime of the switch. A
/// tray seen for the first time keeps an assignment made by hand unless its
/// tag resolves to a spool.
#[derive(Debug)]
pub struct SpoolSwitch<D> {
    directory: D,
    settings: SettingsFile,
    known: BTreeMap<TrayId, Option<String>>,
}

impl<D> SpoolSwitch<D>
where
    D: SpoolDirectory,
{
    /// Create a new switch resolving tags with `directory` and recording
    /// assignments in `settings`.
    pub fn new(directory: D, settings: SettingsFile) -> Self {
        Self {
            directory,
            settings,
            known: BTreeMap::new(),
        }
    }

    /// The settings file assignments are written to.
    pub fn settings(&self) -> &SettingsFile {
        &self.settings
    }

    /// Bring the assignments in line with the AMS section of `push`. Reports
    /// without one are ignored.
    pub async fn sync(&mut self, push: &PushStatus) {
        let Some(units) = push.ams.as_ref().and_then(|ams| ams.ams.as_ref()) else {
            return;
        };

        for unit in units {
            for reported in &unit.tray {
                let Some(tray) = tray_id(&unit.id, &reported.id) else {
                    tracing::warn!(unit = unit.id, tray = reported.id, "unparsable ams tray id");
                    continue;
                };
                self.sync_tray(tray, reported).await;
            }
        }
    }

    async fn sync_tray(&mut self, tray: TrayId, reported: &PrintTray) {
        let tag = reported
            .tray_uuid
            .as_deref()
            .filter(|tag| !tag.is_empty() && *tag != UNKNOWN_TAG);
        let first_sight = match self.known.get(&tray) {
            Some(previous) if previous.as_deref() == tag => return,
            Some(_) => false,
            None => true,
        };

        let spool = match tag {
            Some(tag) => match self.directory.spool_for_tag(tag).await {
                Ok(spool) => spool,
                Err(e) => {
                    // Left unrecorded so the next report retries the lookup.
                    tracing::error!(tray, tag, error = format!("{:?}", e), "failed to look up spool tag");
                    return;
                }
            },
            None => None,
        };

        let updated = self.settings.update(|settings| match spool {
            Some(spool) => settings.lock_tray(tray, spool),
            None => settings.unlock_tray(tray, !first_sight),
        });

        match updated {
            Ok(true) => tracing::info!(
                tray,
                tag,
                spool,
                filament = reported.tray_type.as_deref(),
                color = reported.tray_color.as_deref(),
                "tray assignment updated"
            ),
            Ok(false) => tracing::debug!(tray, tag, spool, "tray assignment unchanged"),
            Err(e) => {
                tracing::error!(tray, error = format!("{:?}", e), "failed to update tray assignment");
                return;
            }
        }
        self.known.insert(tray, tag.map(str::to_owned));
    }
}

/// AMS trays are numbered `unit * 4 + slot`.
fn tray_id(unit: &str, slot: &str) -> Option<TrayId> {
    let unit: TrayId = unit.parse().ok()?;
    let slot: TrayId = slot.parse().ok()?;
    unit.checked_mul(4)?.checked_add(slot)
}
