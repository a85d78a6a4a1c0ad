//! Evaluation of Bambu Lab gcode into per layer filament usage.
//!
//! The slicer marks layer boundaries with `M73 L<n>` and filament changes
//! with `M620 S<slot>`. Every extruding move in between is attributed to the
//! active slot on the current layer.

mod instruction;
mod usage;

pub use instruction::Instruction;
pub use usage::{evaluate, Evaluation, LayerUsage, UsageTable};
