//! Last known state of the printer, assembled from partial status pushes.

use bambulabs::message::{GcodeState, PushStatus};
use serde::Serialize;

use crate::TaskIdentity;

/// Snapshot of the printer built up from every `push_status` seen so far.
///
/// Pushes only carry the fields that changed, so the task identity of a
/// state change usually comes from an earlier report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrinterStatus {
    /// State of the gcode runner.
    pub gcode_state: Option<GcodeState>,
    /// Layer currently printing.
    pub layer_num: Option<u32>,
    /// Number of layers of the job.
    pub total_layer_num: Option<u32>,
    /// Progress in percent.
    pub mc_percent: Option<i64>,
    /// Remaining time in minutes.
    pub mc_remaining_time: Option<i64>,
    /// Task identifier of the job.
    pub task_id: Option<String>,
    /// Sub-task identifier of the job.
    pub subtask_id: Option<String>,
    /// Name of the job.
    pub subtask_name: Option<String>,
    /// Gcode file of the job.
    pub gcode_file: Option<String>,
}

fn merge<T>(field: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *field = update;
    }
}

impl PrinterStatus {
    /// Fold a status push into the snapshot. Fields missing from the push
    /// keep their previous value.
    pub fn merge(&mut self, push: &PushStatus) {
        merge(&mut self.gcode_state, push.gcode_state.clone());
        merge(&mut self.layer_num, push.layer_num.and_then(|l| u32::try_from(l).ok()));
        merge(
            &mut self.total_layer_num,
            push.total_layer_num.and_then(|l| u32::try_from(l).ok()),
        );
        merge(&mut self.mc_percent, push.mc_percent);
        merge(&mut self.mc_remaining_time, push.mc_remaining_time);
        merge(&mut self.task_id, push.task_id.clone());
        merge(&mut self.subtask_id, push.subtask_id.clone());
        merge(&mut self.subtask_name, push.subtask_name.clone());
        merge(&mut self.gcode_file, push.gcode_file.clone());
    }

    /// Identity of the current job, once both ids have been reported.
    pub fn identity(&self) -> Option<TaskIdentity> {
        Some(TaskIdentity::new(self.task_id.clone()?, self.subtask_id.clone()?))
    }
}
