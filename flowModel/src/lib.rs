// Module declarations for the radiation flow model

// Error type shared by every layer
pub mod error;

// Core model computations
pub mod core {
    pub mod radiation;
    pub mod calibration;
    pub mod optimizer;
}

// Configuration modules
pub mod config {
    pub mod constants;
    pub mod model_config;
}

// Model definitions
pub mod models {
    pub mod population;
}

// Data types and loaders
pub mod data {
    pub mod poi;
    pub mod locations_loader;
}

// Utility functions
pub mod utils {
    pub mod spatial_index;
    pub mod logging;
    pub mod csv_export;
    pub mod traits;
}

// CLI interface
pub mod cli {
    pub mod cli;
}

// Re-export commonly used items
pub use crate::core::calibration::{CalibrationEngine, CalibrationResult};
pub use crate::core::radiation::{ModelVariant, PairFlow, PairFlows, RadiationModel};
pub use crate::config::model_config::{CalibrationConfig, LookupPolicy, ModelConfig};
pub use crate::data::poi::{Coordinate, Location};
pub use crate::error::{RadiationError, Result};
pub use crate::models::population::PopulationIndex;
