//! The print lifecycle: turns printer events into filament consumption.
//!
//! A [FilamentTracker] is either idle or tracking a single print. When a
//! print starts, the gcode of its project archive is evaluated into a
//! [UsageTable] and every layer the printer reports is consumed against the
//! [Inventory] exactly once. A [CheckpointStore] records the progress so a
//! restarted process resumes where the previous one stopped.

mod dispatch;
mod event;
mod session;

use std::path::PathBuf;

use bambulabs::message::GcodeState;

pub use dispatch::Dispatcher;
pub use event::{PrintStart, PrinterEvent};
pub use session::PrintSession;

use crate::{
    gcode::{evaluate, LayerUsage, UsageTable},
    threemf::{extract_gcode, ExtractError},
    CheckpointStore, Inventory, ModelProvider, SlotMapping, TaskIdentity, TrayConfiguration,
};

/// Tracks filament consumption of the print in progress.
#[derive(Debug)]
pub struct FilamentTracker<M, I, T> {
    models: M,
    inventory: I,
    trays: T,
    checkpoints: CheckpointStore,
    session: Option<PrintSession>,
    last_state: Option<GcodeState>,
}

impl<M, I, T> FilamentTracker<M, I, T>
where
    M: ModelProvider,
    I: Inventory,
    T: TrayConfiguration,
{
    /// Create a new, idle tracker.
    pub fn new(models: M, inventory: I, trays: T, checkpoints: CheckpointStore) -> Self {
        Self {
            models,
            inventory,
            trays,
            checkpoints,
            session: None,
            last_state: None,
        }
    }

    /// Whether a print is being tracked.
    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// The print being tracked.
    pub fn session(&self) -> Option<&PrintSession> {
        self.session.as_ref()
    }

    /// The inventory consumption is reported to.
    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// The checkpoint store of this tracker.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Act on a printer event. Failures are logged; tracking of the print is
    /// given up where it cannot continue.
    pub async fn handle_event(&mut self, event: PrinterEvent) {
        match event {
            PrinterEvent::PrintStart(start) => self.start_print(start).await,
            PrinterEvent::LayerChanged { layer } => self.change_layer(layer).await,
            PrinterEvent::StateChanged { state, identity } => self.change_state(state, identity).await,
        }
    }

    async fn start_print(&mut self, start: PrintStart) {
        if let Some(previous) = self.session.take() {
            tracing::warn!(
                identity = previous.identity.to_string(),
                "print started while another was tracked, dropping it"
            );
        }

        tracing::info!(identity = start.identity.to_string(), url = start.url, "print started");

        let archive = match self.models.fetch(&start.url).await {
            Ok(archive) => archive,
            Err(e) => {
                tracing::error!(
                    identity = start.identity.to_string(),
                    error = format!("{:?}", e),
                    "model unavailable, not tracking this print"
                );
                self.clear_checkpoint();
                return;
            }
        };

        let Some((gcode_file, usage)) = load_usage(archive.path().to_owned(), start.gcode_file.clone()).await else {
            self.clear_checkpoint();
            return;
        };

        let slot_mapping = SlotMapping::for_print(start.use_ams, start.ams_mapping.as_deref());
        if let Err(e) = self
            .checkpoints
            .save(&start.identity, 0, &slot_mapping, &gcode_file, archive.path())
        {
            tracing::error!(error = format!("{:?}", e), "failed to save checkpoint");
        }

        tracing::info!(
            identity = start.identity.to_string(),
            gcode_file,
            layers = usage.len(),
            uses_feeder = slot_mapping.uses_feeder(),
            "tracking print"
        );
        self.session = Some(PrintSession::new(start.identity, usage, slot_mapping));
        self.change_layer(0).await;
    }

    async fn change_layer(&mut self, layer: u32) {
        let Some(session) = self.session.as_mut() else {
            tracing::trace!(layer, "layer change while idle");
            return;
        };
        if session.is_spent(layer) {
            tracing::trace!(layer, "layer already consumed");
            return;
        }

        for pending in session.pending_through(layer) {
            if let Some(usage) = session.usage.layer(pending) {
                consume_layer(&self.inventory, &self.trays, &session.slot_mapping, pending, usage).await;
            }
            session.spent.insert(pending);
        }
        session.last_layer = Some(layer);

        if let Err(e) = self.checkpoints.advance(layer) {
            tracing::error!(layer, error = format!("{:?}", e), "failed to advance checkpoint");
        }
    }

    async fn change_state(&mut self, state: GcodeState, identity: Option<TaskIdentity>) {
        if self.last_state.as_ref() == Some(&state) {
            return;
        }
        // Leave the edge unobserved until the job identity is known, so a
        // later report carrying it can still resume the print.
        if state == GcodeState::Running && identity.is_none() && !self.is_tracking() {
            tracing::debug!("print running with unknown identity, waiting for it before resuming");
            return;
        }
        tracing::debug!(
            from = self.last_state.as_ref().map(ToString::to_string),
            to = state.to_string(),
            "printer state changed"
        );
        self.last_state = Some(state.clone());

        match (state, self.is_tracking()) {
            (GcodeState::Finish, true) => self.finish_print().await,
            (GcodeState::Failed, true) => {
                if let Some(session) = self.session.take() {
                    tracing::warn!(
                        identity = session.identity.to_string(),
                        spent = session.spent.len(),
                        "print failed, remaining layers not consumed"
                    );
                }
                self.clear_checkpoint();
            }
            (GcodeState::Finish | GcodeState::Failed, false) => self.clear_checkpoint(),
            (GcodeState::Running, false) => {
                if let Some(identity) = identity {
                    self.resume_print(identity).await;
                }
            }
            _ => {}
        }
    }

    async fn finish_print(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        for layer in session.unspent() {
            if let Some(usage) = session.usage.layer(layer) {
                consume_layer(&self.inventory, &self.trays, &session.slot_mapping, layer, usage).await;
            }
            session.spent.insert(layer);
        }

        tracing::info!(
            identity = session.identity.to_string(),
            layers = session.spent.len(),
            "print finished"
        );
        self.clear_checkpoint();
    }

    async fn resume_print(&mut self, identity: TaskIdentity) {
        let Some(checkpoint) = self.checkpoints.recover(&identity) else {
            tracing::debug!(identity = identity.to_string(), "no checkpoint to resume from");
            return;
        };

        let Some((_, usage)) = load_usage(checkpoint.archive.clone(), Some(checkpoint.gcode_file.clone())).await else {
            return;
        };

        tracing::info!(
            identity = identity.to_string(),
            current_layer = checkpoint.current_layer,
            "resumed tracking from checkpoint"
        );
        self.session = Some(PrintSession::resumed(
            checkpoint.identity,
            usage,
            checkpoint.slot_mapping,
            checkpoint.current_layer,
        ));
    }

    fn clear_checkpoint(&self) {
        if let Err(e) = self.checkpoints.clear() {
            tracing::error!(error = format!("{:?}", e), "failed to clear checkpoint");
        }
    }
}

/// Extract and evaluate the gcode of `archive` on a blocking thread.
async fn load_usage(archive: PathBuf, gcode_file: Option<String>) -> Option<(String, UsageTable)> {
    let result = tokio::task::spawn_blocking(move || {
        let extracted = extract_gcode(&archive, gcode_file.as_deref())?;
        Ok::<_, ExtractError>((extracted.name, evaluate(&extracted.gcode)))
    })
    .await;

    match result {
        Ok(Ok((name, evaluation))) => {
            if !evaluation.orphaned_extrusions.is_empty() {
                tracing::warn!(
                    gcode_file = name,
                    lines = format!("{:?}", evaluation.orphaned_extrusions),
                    "extrusions without an active filament were dropped"
                );
            }
            Some((name, evaluation.usage))
        }
        Ok(Err(e)) => {
            tracing::error!(error = format!("{:?}", e), "gcode unavailable, not tracking this print");
            None
        }
        Err(e) => {
            tracing::error!(error = format!("{:?}", e), "gcode evaluation panicked");
            None
        }
    }
}

/// Consume every row of one layer. Rows that cannot be attributed to a
/// spool are skipped.
async fn consume_layer<I, T>(inventory: &I, trays: &T, slot_mapping: &SlotMapping, layer: u32, usage: &LayerUsage)
where
    I: Inventory,
    T: TrayConfiguration,
{
    for (slot, length) in usage.iter() {
        if length <= 0.0 {
            tracing::debug!(layer, slot, length, "no net extrusion, nothing to consume");
            continue;
        }

        let Some(tray) = slot_mapping.tray_for(slot) else {
            tracing::warn!(layer, slot, length, "slot is not mapped to a tray");
            continue;
        };

        let spool = match trays.spool_for_tray(tray) {
            Ok(Some(spool)) => spool,
            Ok(None) => {
                tracing::warn!(layer, slot, tray, length, "no spool assigned to tray");
                continue;
            }
            Err(e) => {
                tracing::error!(layer, tray, error = format!("{:?}", e), "failed to look up tray assignment");
                continue;
            }
        };

        match inventory.consume(spool, length).await {
            Ok(()) => tracing::debug!(layer, slot, tray, spool, length, "consumed filament"),
            Err(e) => tracing::error!(layer, spool, length, error = format!("{:?}", e), "failed to consume filament"),
        }
    }
}
