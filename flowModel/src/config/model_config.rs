use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::constants::{
    DEFAULT_ARMIJO_C1, DEFAULT_FD_STEP, DEFAULT_GRADIENT_TOLERANCE, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MAX_LINE_SEARCH, DEFAULT_OBJECTIVE_TOLERANCE,
};
use crate::core::radiation::ModelVariant;
use crate::error::{RadiationError, Result};

/// What a population lookup does when the coordinate is not indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Substitute the value of the closest indexed coordinate.
    #[default]
    Nearest,
    /// Fail with `RadiationError::Lookup`.
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub max_iterations: usize,
    pub gradient_tolerance: f64,  // Projected gradient norm treated as stationary
    pub objective_tolerance: f64, // Objective change treated as stalled
    pub fd_step: f64,
    pub armijo_c1: f64,
    pub max_line_search: usize,
    pub parallel: bool, // Evaluate pair flows with rayon inside each objective call
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            gradient_tolerance: DEFAULT_GRADIENT_TOLERANCE,
            objective_tolerance: DEFAULT_OBJECTIVE_TOLERANCE,
            fd_step: DEFAULT_FD_STEP,
            armijo_c1: DEFAULT_ARMIJO_C1,
            max_line_search: DEFAULT_MAX_LINE_SEARCH,
            parallel: false,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(RadiationError::InvalidConfig(format!("{} must be positive, got {}", name, value)))
            }
        };
        positive("gradient_tolerance", self.gradient_tolerance)?;
        positive("objective_tolerance", self.objective_tolerance)?;
        positive("fd_step", self.fd_step)?;
        if !(self.armijo_c1 > 0.0 && self.armijo_c1 < 1.0) {
            return Err(RadiationError::InvalidConfig(format!(
                "armijo_c1 must lie in (0, 1), got {}",
                self.armijo_c1
            )));
        }
        if self.max_iterations == 0 || self.max_line_search == 0 {
            return Err(RadiationError::InvalidConfig(
                "iteration budgets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub total_movers: Option<f64>, // Nc; None means outflows must be supplied or calibrated
    pub lookup_policy: LookupPolicy,
    pub variant: ModelVariant,
    pub calibration: CalibrationConfig,
}

impl ModelConfig {
    pub fn with_total_movers(total_movers: f64) -> Self {
        Self {
            total_movers: Some(total_movers),
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: ModelConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(nc) = self.total_movers {
            if !nc.is_finite() || nc <= 0.0 {
                return Err(RadiationError::InvalidTotalMovers(nc));
            }
        }
        self.calibration.validate()
    }
}
