use std::{collections::BTreeMap, path::Path};

use anyhow::Result;
use serde::Serialize;
use spool_tracker::{extract_gcode, gcode::UsageTable};

#[derive(Serialize)]
struct Report {
    gcode_file: String,
    layers: UsageTable,
    totals: BTreeMap<u32, f64>,
    orphaned_extrusions: Vec<usize>,
}

pub async fn main(archive: &Path, gcode_file: Option<&str>) -> Result<()> {
    let archive = archive.to_owned();
    let gcode_file = gcode_file.map(str::to_owned);

    let report = tokio::task::spawn_blocking(move || -> Result<Report> {
        let extracted = extract_gcode(&archive, gcode_file.as_deref())?;
        let evaluation = spool_tracker::gcode::evaluate(&extracted.gcode);

        let mut totals = BTreeMap::new();
        for (_, usage) in evaluation.usage.iter() {
            for (slot, length) in usage.iter() {
                *totals.entry(slot).or_insert(0.0) += length;
            }
        }

        Ok(Report {
            gcode_file: extracted.name,
            layers: evaluation.usage,
            totals,
            orphaned_extrusions: evaluation.orphaned_extrusions,
        })
    })
    .await??;

    tracing::debug!(
        gcode_file = report.gcode_file,
        layers = report.layers.len(),
        "evaluated"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
