use std::collections::BTreeSet;

use crate::{gcode::UsageTable, SlotMapping, TaskIdentity};

/// State of the print being tracked.
///
/// A layer counts as spent once the printer has reported it or a later
/// layer. `spent` only holds layers of the usage table, so its size is
/// bounded by the table whatever layer numbers the printer reports.
#[derive(Debug, Clone)]
pub struct PrintSession {
    pub(crate) identity: TaskIdentity,
    pub(crate) usage: UsageTable,
    pub(crate) slot_mapping: SlotMapping,
    pub(crate) spent: BTreeSet<u32>,
    pub(crate) last_layer: Option<u32>,
}

impl PrintSession {
    pub(crate) fn new(identity: TaskIdentity, usage: UsageTable, slot_mapping: SlotMapping) -> Self {
        Self {
            identity,
            usage,
            slot_mapping,
            spent: BTreeSet::new(),
            last_layer: None,
        }
    }

    /// A session picked up from a checkpoint; every layer up to and
    /// including `current_layer` was already consumed.
    pub(crate) fn resumed(
        identity: TaskIdentity,
        usage: UsageTable,
        slot_mapping: SlotMapping,
        current_layer: u32,
    ) -> Self {
        Self {
            spent: usage.layers_in(..=current_layer).collect(),
            last_layer: Some(current_layer),
            ..Self::new(identity, usage, slot_mapping)
        }
    }

    /// Identity of the print.
    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    /// Usage evaluated from the print's gcode.
    pub fn usage(&self) -> &UsageTable {
        &self.usage
    }

    /// How gcode slots map to trays.
    pub fn slot_mapping(&self) -> &SlotMapping {
        &self.slot_mapping
    }

    /// Whether the AMS feeds the print.
    pub fn uses_feeder(&self) -> bool {
        self.slot_mapping.uses_feeder()
    }

    /// Layers of the usage table whose usage has been consumed.
    pub fn spent_layers(&self) -> &BTreeSet<u32> {
        &self.spent
    }

    /// Whether `layer` has been consumed.
    pub fn is_spent(&self, layer: u32) -> bool {
        self.last_layer.is_some_and(|last| layer <= last) || self.spent.contains(&layer)
    }

    /// Last layer the printer reported.
    pub fn last_layer(&self) -> Option<u32> {
        self.last_layer
    }

    /// Table layers to consume when the printer reports `layer`, in order.
    pub(crate) fn pending_through(&self, layer: u32) -> Vec<u32> {
        let first = match self.last_layer {
            Some(u32::MAX) => return vec![],
            Some(last) => last + 1,
            None => 0,
        };
        if first > layer {
            return vec![];
        }

        self.usage
            .layers_in(first..=layer)
            .filter(|l| !self.spent.contains(l))
            .collect()
    }

    /// Layers of the usage table that were never consumed, in order.
    pub(crate) fn unspent(&self) -> Vec<u32> {
        self.usage.layers().filter(|l| !self.is_spent(*l)).collect()
    }
}
