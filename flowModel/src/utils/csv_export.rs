use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::core::calibration::CalibrationResult;
use crate::core::radiation::PairFlow;
use crate::data::poi::Coordinate;
use crate::error::Result;
use crate::utils::logging::{self, FileIOType, OperationCategory};

#[derive(Serialize)]
struct FlowRow {
    origin_x: f64,
    origin_y: f64,
    destination_x: f64,
    destination_y: f64,
    flow: f64,
}

#[derive(Serialize)]
struct OutflowRow {
    x: f64,
    y: f64,
    population: f64,
    outflow: f64,
    predicted: f64,
}

/// Stream pair flows to CSV; returns how many rows were written.
pub fn write_flows<W: Write, I: IntoIterator<Item = PairFlow>>(writer: W, flows: I) -> Result<usize> {
    let mut csv_writer = Writer::from_writer(writer);
    let mut rows = 0;
    for pair in flows {
        csv_writer.serialize(FlowRow {
            origin_x: pair.origin.x,
            origin_y: pair.origin.y,
            destination_x: pair.destination.x,
            destination_y: pair.destination.y,
            flow: pair.flow,
        })?;
        rows += 1;
    }
    csv_writer.flush()?;
    Ok(rows)
}

pub fn export_flows<P: AsRef<Path>, I: IntoIterator<Item = PairFlow>>(path: P, flows: I) -> Result<usize> {
    let _timing = logging::start_timing("export_flows", OperationCategory::FileIO { subcategory: FileIOType::ResultsSave });
    let file = File::create(path.as_ref())?;
    let rows = write_flows(file, flows)?;
    info!("Wrote {} pair flows to {}", rows, path.as_ref().display());
    Ok(rows)
}

pub fn write_calibration<W: Write>(
    writer: W,
    locations: &[Coordinate],
    populations: &[f64],
    result: &CalibrationResult,
) -> Result<()> {
    let mut csv_writer = Writer::from_writer(writer);
    for (i, loc) in locations.iter().enumerate() {
        csv_writer.serialize(OutflowRow {
            x: loc.x,
            y: loc.y,
            population: populations[i],
            outflow: result.outflows[i],
            predicted: result.predicted_totals[i],
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_calibration<P: AsRef<Path>>(
    path: P,
    locations: &[Coordinate],
    populations: &[f64],
    result: &CalibrationResult,
) -> Result<()> {
    let _timing = logging::start_timing("export_calibration", OperationCategory::FileIO { subcategory: FileIOType::ResultsSave });
    let file = File::create(path.as_ref())?;
    write_calibration(file, locations, populations, result)?;
    info!("Wrote {} calibrated outflows to {}", locations.len(), path.as_ref().display());
    Ok(())
}
