//! [Inventory] and [SpoolDirectory] implementations.

use std::convert::Infallible;

use anyhow::Result;
use spoolman::{Spool, SpoolUse};

use crate::{Inventory, SpoolDirectory, SpoolId};

impl Inventory for spoolman::Client {
    type Error = anyhow::Error;
    type Record = Spool;

    async fn consume(&self, spool: SpoolId, length_mm: f64) -> Result<()> {
        let updated = self.use_spool(spool, SpoolUse::Length(length_mm)).await?;
        tracing::trace!(
            spool,
            remaining_length = updated.remaining_length,
            used_length = updated.used_length,
            "spool updated"
        );
        Ok(())
    }

    async fn lookup(&self, spool: SpoolId) -> Result<Option<Spool>> {
        self.get_spool(spool).await
    }
}

/// An inventory which only logs what would have been consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunInventory;

impl Inventory for DryRunInventory {
    type Error = Infallible;
    type Record = ();

    async fn consume(&self, spool: SpoolId, length_mm: f64) -> Result<(), Infallible> {
        tracing::info!(spool, length_mm, "would consume filament");
        Ok(())
    }

    async fn lookup(&self, _spool: SpoolId) -> Result<Option<()>, Infallible> {
        Ok(None)
    }
}

/// Finds spools in Spoolman by the tag stored in one of their extra fields.
#[derive(Debug, Clone)]
pub struct TagDirectory {
    client: spoolman::Client,
    field: String,
}

impl TagDirectory {
    /// Look tags up in the extra `field` of the spools known to `client`.
    pub fn new(client: spoolman::Client, field: impl Into<String>) -> Self {
        Self {
            client,
            field: field.into(),
        }
    }
}

impl SpoolDirectory for TagDirectory {
    type Error = anyhow::Error;

    async fn spool_for_tag(&self, tag: &str) -> Result<Option<SpoolId>> {
        let spool = self.client.find_by_extra(&self.field, tag).await?;
        tracing::trace!(field = self.field, tag, spool = spool.as_ref().map(|s| s.id), "looked up spool tag");
        Ok(spool.map(|s| s.id))
    }
}
