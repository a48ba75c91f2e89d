use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Deserialize;

use super::poi::{Coordinate, Location};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct LocationRecord {
    x: f64,
    y: f64,
    #[serde(alias = "pop", alias = "value")]
    population: f64,
}

/// Parallel coordinate/population columns, the shape `PopulationIndex::build` takes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationColumns {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Vec<f64>,
}

impl PopulationColumns {
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.xs
            .iter()
            .zip(&self.ys)
            .zip(&self.values)
            .map(|((&x, &y), &v)| Location::new(x, y, v))
            .collect()
    }
}

/// Read `x,y,population` rows. Range checks are left to the index build.
pub fn read_populations<R: Read>(reader: R) -> Result<PopulationColumns> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut columns = PopulationColumns::default();
    for record in csv_reader.deserialize() {
        let record: LocationRecord = record?;
        columns.xs.push(record.x);
        columns.ys.push(record.y);
        columns.values.push(record.population);
    }
    Ok(columns)
}

pub fn load_populations<P: AsRef<Path>>(path: P) -> Result<PopulationColumns> {
    let file = File::open(path)?;
    read_populations(file)
}

#[derive(Debug, Deserialize)]
struct CoordinateRecord {
    x: f64,
    y: f64,
}

/// Read `x,y` rows; any extra columns are ignored.
pub fn load_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<Coordinate>> {
    let file = File::open(path)?;
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut coordinates = Vec::new();
    for record in csv_reader.deserialize() {
        let record: CoordinateRecord = record?;
        coordinates.push(Coordinate::new(record.x, record.y));
    }
    Ok(coordinates)
}
