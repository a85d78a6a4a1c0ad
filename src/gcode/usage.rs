use std::{collections::BTreeMap, ops::RangeBounds};

use serde::{Deserialize, Serialize};

use super::Instruction;

/// Layer marker, `M73 L<layer>`. `M73` without `L` is a progress report.
const LAYER_CHANGE: &str = "M73";

/// Filament change, `M620 S<slot><tag>`.
const TOOL_CHANGE: &str = "M620";

/// `M620 S255` unloads everything; no filament is active afterwards.
const UNLOAD_ALL: &str = "255";

const MOVES: [&str; 4] = ["G0", "G1", "G2", "G3"];

/// Extruded length, in millimeters, per filament slot on one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerUsage(BTreeMap<u32, f64>);

impl LayerUsage {
    /// Length extruded from `slot`, if it was used on this layer at all.
    pub fn get(&self, slot: u32) -> Option<f64> {
        self.0.get(&slot).copied()
    }

    /// Iterate over `(slot, length)` rows in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(slot, length)| (*slot, *length))
    }

    /// Number of slots used on this layer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no slot extruded on this layer.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total length extruded on this layer over all slots.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    fn add(&mut self, slot: u32, length: f64) {
        *self.0.entry(slot).or_insert(0.0) += length;
    }
}

impl FromIterator<(u32, f64)> for LayerUsage {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Filament usage of a whole print, keyed by layer number. Layers without
/// any extrusion are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageTable(BTreeMap<u32, LayerUsage>);

impl UsageTable {
    /// Usage of `layer`, or `None` if nothing was extruded on it.
    pub fn layer(&self, layer: u32) -> Option<&LayerUsage> {
        self.0.get(&layer)
    }

    /// Iterate over the layers with extrusion, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &LayerUsage)> + '_ {
        self.0.iter().map(|(layer, usage)| (*layer, usage))
    }

    /// Layer numbers with extrusion, in ascending order.
    pub fn layers(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    /// Layer numbers with extrusion within `range`, in ascending order.
    pub fn layers_in(&self, range: impl RangeBounds<u32>) -> impl Iterator<Item = u32> + '_ {
        self.0.range(range).map(|(layer, _)| *layer)
    }

    /// Number of layers with extrusion.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the stream never extruded anything.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total length extruded from `slot` over the whole print.
    pub fn slot_total(&self, slot: u32) -> f64 {
        self.0.values().filter_map(|usage| usage.get(slot)).sum()
    }
}

impl FromIterator<(u32, LayerUsage)> for UsageTable {
    fn from_iter<I: IntoIterator<Item = (u32, LayerUsage)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The result of evaluating a gcode stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Per layer, per slot usage.
    pub usage: UsageTable,

    /// 1-based line numbers of extrusions that happened with no filament
    /// loaded. Their length is not part of `usage`.
    pub orphaned_extrusions: Vec<usize>,
}

#[derive(Default)]
struct Evaluator {
    layer: u32,
    active: Option<u32>,
    pending: LayerUsage,
    table: BTreeMap<u32, LayerUsage>,
    orphaned: Vec<usize>,
}

impl Evaluator {
    fn step(&mut self, line_number: usize, instruction: &Instruction) {
        match instruction.opcode() {
            LAYER_CHANGE => {
                let Some(raw) = instruction.param('L') else {
                    return;
                };
                let Ok(next) = raw.parse::<u32>() else {
                    tracing::warn!(line = line_number, value = raw, "unparsable layer number");
                    return;
                };

                tracing::trace!("Layer change: {} -> {}", self.layer, next);
                self.flush();
                self.layer = next;
            }
            TOOL_CHANGE => {
                let Some(raw) = instruction.param('S') else {
                    return;
                };
                if raw == UNLOAD_ALL {
                    tracing::trace!(line = line_number, "full unload");
                    self.active = None;
                    return;
                }

                match parse_slot(raw) {
                    Some(slot) => {
                        tracing::trace!("Filament change from {:?} to {}", self.active, slot);
                        self.active = Some(slot);
                    }
                    None => tracing::warn!(line = line_number, value = raw, "unparsable filament slot"),
                }
            }
            opcode if MOVES.contains(&opcode) => {
                let Some(raw) = instruction.param('E') else {
                    return;
                };
                let Ok(length) = raw.parse::<f64>() else {
                    tracing::warn!(line = line_number, value = raw, "unparsable extrusion length");
                    return;
                };

                match self.active {
                    Some(slot) => self.pending.add(slot, length),
                    None => {
                        tracing::warn!(line = line_number, length, "extrusion with no active filament, dropping it");
                        self.orphaned.push(line_number);
                    }
                }
            }
            _ => {}
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let usage = std::mem::take(&mut self.pending);
            self.table.insert(self.layer, usage);
        }
    }

    fn finish(mut self) -> Evaluation {
        self.flush();
        Evaluation {
            usage: UsageTable(self.table),
            orphaned_extrusions: self.orphaned,
        }
    }
}

/// Slot values carry a one character tag after the index, e.g. `S1A`.
fn parse_slot(raw: &str) -> Option<u32> {
    let digits = match raw.chars().last() {
        Some(tag) if !tag.is_ascii_digit() => &raw[..raw.len() - tag.len_utf8()],
        _ => raw,
    };
    digits.parse().ok()
}

/// Evaluate a gcode stream into the length of filament each slot extrudes
/// on every layer.
///
/// Extrusion lengths are treated as relative and summed in stream order.
/// Layer numbers come from `M73 L` markers; everything before the first
/// marker belongs to layer 0.
pub fn evaluate(gcode: &str) -> Evaluation {
    let mut evaluator = Evaluator::default();
    let mut instructions = 0usize;

    for (index, line) in gcode.lines().enumerate() {
        if let Some(instruction) = Instruction::parse(line) {
            instructions += 1;
            evaluator.step(index + 1, &instruction);
        }
    }

    let evaluation = evaluator.finish();
    tracing::info!(
        instructions,
        layers = evaluation.usage.len(),
        orphaned = evaluation.orphaned_extrusions.len(),
        "evaluated gcode"
    );
    evaluation
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn layer(rows: &[(u32, f64)]) -> LayerUsage {
        rows.iter().copied().collect()
    }

    #[test]
    fn test_evaluate_unload_scenario() {
        let gcode = "M620 S1A\nG1 E1.0\nM73 L1\nG1 E2.0\nM620 S255\nG1 E3.0\n";

        let evaluation = evaluate(gcode);

        let expected: UsageTable = [(0, layer(&[(1, 1.0)])), (1, layer(&[(1, 2.0)]))].into_iter().collect();
        assert_eq!(evaluation.usage, expected);
        assert_eq!(evaluation.orphaned_extrusions, vec![6]);
    }

    #[test]
    fn test_evaluate_omits_empty_layers() {
        let gcode = "\
M620 S0A
G1 E0.5
M73 L1
G1 X10 Y10
M73 L2
M73 L3
G1 E0.25
";

        let evaluation = evaluate(gcode);

        assert_eq!(evaluation.usage.layers().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(evaluation.usage.layer(1), None);
        assert_eq!(evaluation.usage.layer(2), None);
        assert_eq!(evaluation.usage.layer(3).unwrap().get(0), Some(0.25));
        assert_eq!(evaluation.usage.layers_in(1..=2).count(), 0);
        assert_eq!(evaluation.usage.layers_in(1..=u32::MAX).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_evaluate_multiple_filaments_per_layer() {
        let gcode = "\
; HEADER_BLOCK_START
M73 L1
M620 S0A
G1 X1 E1.5
G1 X2 E-0.5 ; retract
G1 X3 E0.5
M620 S3A
G2 X5 Y5 I1 J1 E2
G3 X6 Y6 I1 J1 E2
M73 L2
M620 S0A
G0 E4
";

        let evaluation = evaluate(gcode);

        assert_eq!(evaluation.usage.layer(0), None);
        assert_eq!(evaluation.usage.layer(1), Some(&layer(&[(0, 1.5), (3, 4.0)])));
        assert_eq!(evaluation.usage.layer(2), Some(&layer(&[(0, 4.0)])));
        assert!(evaluation.orphaned_extrusions.is_empty());
    }

    #[test]
    fn test_evaluate_conserves_length_per_slot() {
        let mut gcode = String::new();
        let mut expected = [0.0f64; 4];
        for n in 0..200u32 {
            if n % 17 == 0 {
                gcode.push_str(&format!("M73 L{}\n", n / 17 + 1));
            }
            let slot = n % 4;
            if n % 5 == 0 {
                gcode.push_str(&format!("M620 S{}A\n", slot));
            }
            let current = (n - n % 5) % 4;
            let length = f64::from(n % 7) * 0.137 + 0.01;
            gcode.push_str(&format!("G1 X{} E{}\n", n, length));
            expected[current as usize] += length;
        }

        let evaluation = evaluate(&gcode);

        for (slot, total) in expected.iter().enumerate() {
            let slot = slot as u32;
            assert!((evaluation.usage.slot_total(slot) - total).abs() < 1e-9, "slot {}", slot);
        }
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let gcode = "M620 S2A\nG1 E0.1\nG1 E0.2\nG1 E0.3\nM73 L1\nG1 E0.7\n";

        assert_eq!(evaluate(gcode), evaluate(gcode));
    }

    #[test]
    fn test_evaluate_ignores_progress_reports_and_bad_values() {
        let gcode = "\
M620 S1A
M73 P10 R30
G1 E1
M620 SXYZ
G1 Ebogus
M73 Lx
G1 E1
M620 M
";

        let evaluation = evaluate(gcode);

        let expected: UsageTable = [(0, layer(&[(1, 2.0)]))].into_iter().collect();
        assert_eq!(evaluation.usage, expected);
    }

    #[test]
    fn test_evaluate_empty_stream() {
        let evaluation = evaluate("; nothing but comments\n\n");

        assert!(evaluation.usage.is_empty());
        assert!(evaluation.orphaned_extrusions.is_empty());
    }

    #[test]
    fn test_parse_slot() {
        assert_eq!(parse_slot("1A"), Some(1));
        assert_eq!(parse_slot("12B"), Some(12));
        assert_eq!(parse_slot("3"), Some(3));
        assert_eq!(parse_slot("A"), None);
        assert_eq!(parse_slot(""), None);
    }
}
