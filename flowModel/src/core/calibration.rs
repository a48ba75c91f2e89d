//! Self-consistent outflow calibration.
//!
//! Solves for per-location outflow totals `T_i` such that the flows the radiation model
//! predicts out of each origin add up to `T_i` itself. Each candidate vector is handed to the
//! model by value; nothing on the model is mutated between evaluations.

use tracing::{info, warn};

use crate::config::model_config::CalibrationConfig;
use crate::core::optimizer::{Minimizer, ProjectedBfgs};
use crate::core::radiation::RadiationModel;
use crate::data::poi::Coordinate;
use crate::error::{RadiationError, Result};
use crate::utils::logging::{self, OperationCategory};
use crate::utils::spatial_index::{PointLocator, QuadTree};

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Solved outflow per location, in location order
    pub outflows: Vec<f64>,
    /// Model-predicted total outflow under `outflows`
    pub predicted_totals: Vec<f64>,
    pub mean_squared_error: f64,
    pub converged: bool,
    pub iterations: usize,
    pub function_evaluations: usize,
}

impl CalibrationResult {
    /// Largest |predicted - solved| relative to the solved outflow, with `floor` guarding zeros.
    pub fn max_relative_error(&self, floor: f64) -> f64 {
        self.outflows
            .iter()
            .zip(&self.predicted_totals)
            .map(|(t, p)| (p - t).abs() / t.abs().max(floor))
            .fold(0.0, f64::max)
    }
}

pub struct CalibrationEngine<'a, L: PointLocator = QuadTree, M: Minimizer = ProjectedBfgs> {
    model: &'a RadiationModel<L>,
    config: CalibrationConfig,
    minimizer: M,
}

impl<'a, L: PointLocator> CalibrationEngine<'a, L, ProjectedBfgs> {
    pub fn new(model: &'a RadiationModel<L>, config: CalibrationConfig) -> Result<Self> {
        let minimizer = ProjectedBfgs::with_config(config.clone());
        Self::with_minimizer(model, config, minimizer)
    }
}

impl<'a, L: PointLocator, M: Minimizer> CalibrationEngine<'a, L, M> {
    pub fn with_minimizer(model: &'a RadiationModel<L>, config: CalibrationConfig, minimizer: M) -> Result<Self> {
        config.validate()?;
        if model.locations().len() < 2 {
            return Err(RadiationError::TooFewLocations {
                required: 2,
                provided: model.locations().len(),
            });
        }
        Ok(CalibrationEngine { model, config, minimizer })
    }

    pub fn locations(&self) -> &[Coordinate] {
        self.model.locations()
    }

    /// Mean population per location, N / n, for every location.
    pub fn initial_guess(&self) -> Vec<f64> {
        let n = self.model.locations().len();
        vec![self.model.total_population() / n as f64; n]
    }

    /// Outflows are non-negative with no upper limit.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(0.0, f64::INFINITY); self.model.locations().len()]
    }

    /// Mean squared gap between each candidate outflow and the total the model predicts for it.
    pub fn objective(&self, candidate: &[f64]) -> Result<f64> {
        let predicted = self.model.predicted_outflows(candidate, self.config.parallel)?;
        Ok(mean_squared_gap(&predicted, candidate))
    }

    pub fn calibrate(&self) -> Result<CalibrationResult> {
        self.calibrate_from(&self.initial_guess())
    }

    /// Run the optimizer from a caller-chosen starting vector.
    pub fn calibrate_from(&self, initial_guess: &[f64]) -> Result<CalibrationResult> {
        let _timing = logging::start_timing("CalibrationEngine::calibrate", OperationCategory::Calibration);
        let bounds = self.bounds();
        if initial_guess.len() != bounds.len() {
            return Err(RadiationError::InvalidBounds(format!(
                "initial guess has {} entries for {} locations",
                initial_guess.len(),
                bounds.len()
            )));
        }

        info!(
            "Calibrating outflows for {} locations ({} pairs per evaluation)",
            bounds.len(),
            self.model.pair_count()
        );

        let initial_objective = self.objective(initial_guess)?;
        if !initial_objective.is_finite() {
            return Err(RadiationError::InvalidConfig(format!(
                "objective is {} at the initial guess",
                initial_objective
            )));
        }

        let objective = |candidate: &[f64]| match self.objective(candidate) {
            Ok(value) => value,
            Err(e) => {
                warn!("Objective evaluation failed, treating candidate as infeasible: {}", e);
                f64::INFINITY
            }
        };
        let solution = self.minimizer.minimize(&objective, initial_guess, &bounds)?;
        let predicted_totals = self.model.predicted_outflows(&solution.parameters, self.config.parallel)?;

        if solution.converged {
            info!(
                "Calibration converged after {} iterations (MSE {:e})",
                solution.iterations, solution.objective
            );
        } else {
            warn!(
                "Calibration did not converge after {} iterations (MSE {:e})",
                solution.iterations, solution.objective
            );
        }

        Ok(CalibrationResult {
            outflows: solution.parameters,
            predicted_totals,
            mean_squared_error: solution.objective,
            converged: solution.converged,
            iterations: solution.iterations,
            function_evaluations: solution.function_evaluations,
        })
    }
}

fn mean_squared_gap(predicted: &[f64], candidate: &[f64]) -> f64 {
    if candidate.is_empty() {
        return 0.0;
    }
    let total: f64 = predicted
        .iter()
        .zip(candidate)
        .map(|(p, c)| (p - c).powi(2))
        .sum();
    total / candidate.len() as f64
}
