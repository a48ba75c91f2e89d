//! Error type for population indexing, flow estimation and calibration.

use thiserror::Error;

use crate::core::radiation::ModelVariant;

/// Errors raised by the flow model.
///
/// Everything except `Lookup`, `IndexOutOfRange`, `NotImplemented` and the I/O variants is a
/// configuration error: it is raised at the boundary, before any flow is computed.
#[derive(Error, Debug)]
pub enum RadiationError {
    /// Parallel input lists have different lengths
    #[error("Input length mismatch: {xs} x-coordinates, {ys} y-coordinates, {values} populations")]
    LengthMismatch { xs: usize, ys: usize, values: usize },

    /// A population weight below zero
    #[error("Negative population {value} at index {index}")]
    NegativePopulation { index: usize, value: f64 },

    /// NaN or infinite coordinate/population
    #[error("Non-finite {field} at index {index}")]
    NonFiniteInput { field: &'static str, index: usize },

    /// The same coordinate was supplied twice
    #[error("Duplicate coordinate ({x}, {y}) at index {index}")]
    DuplicateCoordinate { index: usize, x: f64, y: f64 },

    /// Neither a global Nc nor a per-call outflow is available
    #[error("Must assign or supply a value for the total number of movers (Nc)")]
    MissingTotalMovers,

    /// Nc must be a finite positive number
    #[error("Invalid total movers: {0}")]
    InvalidTotalMovers(f64),

    /// Query against an index with no points
    #[error("Population index is empty")]
    EmptyIndex,

    /// Fewer locations than a computation needs
    #[error("Need at least {required} locations, got {provided}")]
    TooFewLocations { required: usize, provided: usize },

    /// A location position past the end of the location list
    #[error("Location index {index} out of range for {len} locations")]
    IndexOutOfRange { index: usize, len: usize },

    /// Optimizer bounds or configuration are unusable
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Any other unusable configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Exact lookup missed
    #[error("No population indexed at ({x}, {y})")]
    Lookup { x: f64, y: f64 },

    /// The selected model variant has no formula yet
    #[error("Model variant {0:?} is not implemented")]
    NotImplemented(ModelVariant),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RadiationError {
    /// True for errors raised while validating inputs or configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RadiationError::LengthMismatch { .. }
                | RadiationError::NegativePopulation { .. }
                | RadiationError::NonFiniteInput { .. }
                | RadiationError::DuplicateCoordinate { .. }
                | RadiationError::MissingTotalMovers
                | RadiationError::InvalidTotalMovers(_)
                | RadiationError::EmptyIndex
                | RadiationError::TooFewLocations { .. }
                | RadiationError::InvalidBounds(_)
                | RadiationError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RadiationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model_config::{CalibrationConfig, LookupPolicy, ModelConfig};
    use crate::core::calibration::CalibrationEngine;
    use crate::core::optimizer::{Minimizer, ProjectedBfgs};
    use crate::core::radiation::RadiationModel;
    use crate::data::poi::Coordinate;
    use crate::models::population::PopulationIndex;

    fn err<T>(result: Result<T>) -> RadiationError {
        match result {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_validation_errors_are_configuration_errors() {
        let pair = |total_movers| ModelConfig {
            total_movers,
            ..ModelConfig::default()
        };
        let single = RadiationModel::from_populations(&[0.0], &[0.0], &[1.0], &ModelConfig::default()).unwrap();
        let zero_budget = CalibrationConfig {
            max_iterations: 0,
            ..CalibrationConfig::default()
        };
        let unimplemented = ModelConfig {
            variant: ModelVariant::Generalized,
            ..ModelConfig::default()
        };

        let errors = vec![
            err(PopulationIndex::new(&[0.0], &[0.0, 1.0], &[1.0])),
            err(PopulationIndex::new(&[0.0], &[0.0], &[-1.0])),
            err(PopulationIndex::new(&[f64::NAN], &[0.0], &[1.0])),
            err(PopulationIndex::new(&[1.0, 1.0], &[0.0, 0.0], &[1.0, 1.0])),
            err(PopulationIndex::new(&[], &[], &[]).unwrap().value_at(&Coordinate::new(0.0, 0.0))),
            err(RadiationModel::from_populations(&[0.0, 1.0], &[0.0, 0.0], &[1.0, 1.0], &pair(None)).unwrap().run_all()),
            err(RadiationModel::from_populations(&[0.0, 1.0], &[0.0, 0.0], &[1.0, 1.0], &pair(Some(-5.0)))),
            err(CalibrationEngine::new(&single, CalibrationConfig::default())),
            err(ProjectedBfgs::new().minimize(&|p: &[f64]| p[0], &[0.0], &[(1.0, 0.0)])),
            err(RadiationModel::from_populations(&[0.0], &[0.0], &[1.0], &ModelConfig {
                calibration: zero_budget,
                ..pair(Some(1.0))
            })),
        ];
        for e in &errors {
            assert!(e.is_configuration(), "{:?} should be a configuration error", e);
        }

        let exact = PopulationIndex::new(&[0.0], &[0.0], &[1.0]).unwrap().with_policy(LookupPolicy::Exact);
        let runtime = vec![
            err(exact.value_at(&Coordinate::new(2.0, 2.0))),
            err(RadiationModel::from_populations(&[0.0], &[0.0], &[1.0], &unimplemented)),
            err(single.flows_from(3, Some(1.0)).map(|flows| flows.count())),
        ];
        for e in &runtime {
            assert!(!e.is_configuration(), "{:?} should not be a configuration error", e);
        }
    }
}
