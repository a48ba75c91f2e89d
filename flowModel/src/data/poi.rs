use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Bitwise hash key; -0.0 and 0.0 map to the same key.
    pub fn key(&self) -> (u64, u64) {
        fn bits(v: f64) -> u64 {
            if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }
        }
        (bits(self.x), bits(self.y))
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Coordinate::new(x, y)
    }
}

/// A point carrying a population weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    pub population: f64,
}

impl Location {
    pub fn new(x: f64, y: f64, population: f64) -> Self {
        Self {
            coordinate: Coordinate::new(x, y),
            population,
        }
    }
}

pub trait POI {
    fn get_coordinate(&self) -> &Coordinate;
    fn get_population(&self) -> f64;
}

impl POI for Location {
    fn get_coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    fn get_population(&self) -> f64 {
        self.population
    }
}
