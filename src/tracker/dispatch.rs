use bambulabs::message::{Message, Print};

use super::{FilamentTracker, PrintStart, PrinterEvent};
use crate::{Inventory, ModelProvider, PrinterStatus, TrayConfiguration};

/// Feeds printer reports to a [FilamentTracker].
///
/// The dispatcher owns the merged [PrinterStatus], so state changes can be
/// tagged with the identity of the job even when the report announcing them
/// does not carry it.
#[derive(Debug)]
pub struct Dispatcher<M, I, T> {
    status: PrinterStatus,
    tracker: FilamentTracker<M, I, T>,
}

impl<M, I, T> Dispatcher<M, I, T>
where
    M: ModelProvider,
    I: Inventory,
    T: TrayConfiguration,
{
    /// Create a new dispatcher for `tracker`.
    pub fn new(tracker: FilamentTracker<M, I, T>) -> Self {
        Self {
            status: PrinterStatus::default(),
            tracker,
        }
    }

    /// The merged status of the printer.
    pub fn status(&self) -> &PrinterStatus {
        &self.status
    }

    /// The tracker events are fed to.
    pub fn tracker(&self) -> &FilamentTracker<M, I, T> {
        &self.tracker
    }

    /// Translate a report into events and hand them to the tracker, one at a
    /// time.
    pub async fn dispatch(&mut self, message: &Message) {
        for event in self.events(message) {
            tracing::trace!(event = format!("{:?}", event), "dispatching");
            self.tracker.handle_event(event).await;
        }
    }

    fn events(&mut self, message: &Message) -> Vec<PrinterEvent> {
        let Message::Print(print) = message else {
            return vec![];
        };

        match print {
            Print::ProjectFile(project) => vec![PrintStart::from(project).into()],
            Print::PushStatus(push) => {
                let identity_known = self.status.identity().is_some();
                self.status.merge(push);
                let identity = self.status.identity();

                // The first report naming the job replays the current state,
                // so a print running since before the identity arrived can
                // still be resumed.
                let state = match (&push.gcode_state, identity_known, &identity) {
                    (Some(state), _, _) => Some(state.clone()),
                    (None, false, Some(_)) => self.status.gcode_state.clone(),
                    _ => None,
                };

                let mut events = vec![];
                if let Some(state) = state {
                    events.push(PrinterEvent::StateChanged { state, identity });
                }
                if let Some(layer) = push.layer_num.and_then(|l| u32::try_from(l).ok()) {
                    events.push(PrinterEvent::LayerChanged { layer });
                }
                events
            }
        }
    }
}
