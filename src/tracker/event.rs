use bambulabs::message::{GcodeState, ProjectFile};

use crate::TaskIdentity;

/// Something that happened on the printer which matters for tracking.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    /// A print was started from a project archive.
    PrintStart(PrintStart),
    /// The printer reported the layer it is printing.
    LayerChanged {
        /// Layer number.
        layer: u32,
    },
    /// The printer reported the state of its gcode runner.
    StateChanged {
        /// Reported state.
        state: GcodeState,
        /// Last known identity of the job, if any.
        identity: Option<TaskIdentity>,
    },
}

/// Everything needed to start tracking a print.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintStart {
    /// Where the project archive can be retrieved from.
    pub url: String,
    /// Whether the AMS feeds the print.
    pub use_ams: bool,
    /// Filament slot to AMS tray mapping.
    pub ams_mapping: Option<Vec<i64>>,
    /// Identity of the job.
    pub identity: TaskIdentity,
    /// Gcode stream to use instead of the archive's default plate.
    pub gcode_file: Option<String>,
}

impl From<&ProjectFile> for PrintStart {
    fn from(project: &ProjectFile) -> Self {
        PrintStart {
            url: project.url.clone(),
            use_ams: project.use_ams,
            ams_mapping: project.ams_mapping.clone(),
            identity: TaskIdentity::new(project.task_id.clone(), project.subtask_id.clone()),
            gcode_file: project.param.clone().filter(|param| !param.is_empty()),
        }
    }
}

impl From<PrintStart> for PrinterEvent {
    fn from(start: PrintStart) -> Self {
        PrinterEvent::PrintStart(start)
    }
}
