use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use radflow::cli::cli::{Args, Command};
use radflow::config::model_config::ModelConfig;
use radflow::core::calibration::CalibrationEngine;
use radflow::core::radiation::RadiationModel;
use radflow::data::locations_loader;
use radflow::models::population::PopulationIndex;
use radflow::utils::csv_export;
use radflow::utils::logging::{self, FileIOType, OperationCategory};

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logging(args.enable_timing(), args.debug_logging());

    let mut config = match args.config() {
        Some(path) => {
            let _timing = logging::start_timing("load_config",
                OperationCategory::FileIO { subcategory: FileIOType::ConfigLoad });
            ModelConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => ModelConfig::default(),
    };
    if let Some(policy) = args.lookup() {
        config.lookup_policy = policy;
    }

    match args.command() {
        Command::Flows { input, locations, total_movers, output } => {
            if let Some(nc) = total_movers {
                config.total_movers = Some(*nc);
            }
            config.validate()?;

            let model = build_model(input, locations.as_ref(), &config, args.quiet())?;
            let flows = model.run_all()?;
            let rows = csv_export::export_flows(output, flows)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} pair flows to {}", rows, output.display());
        }
        Command::Calibrate { input, locations, output, max_iterations, parallel } => {
            if let Some(max_iterations) = max_iterations {
                config.calibration.max_iterations = *max_iterations;
            }
            config.calibration.parallel |= *parallel;
            config.validate()?;

            let model = build_model(input, locations.as_ref(), &config, args.quiet())?;
            let engine = CalibrationEngine::new(&model, config.calibration.clone())?;
            let result = engine.calibrate()?;

            csv_export::export_calibration(output, model.locations(), model.populations(), &result)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Calibration {} after {} iterations (MSE {:.6e}); wrote {}",
                if result.converged { "converged" } else { "did NOT converge" },
                result.iterations,
                result.mean_squared_error,
                output.display()
            );
        }
    }

    logging::print_timing_report();
    Ok(())
}

fn build_model(
    input: &Path,
    locations: Option<&PathBuf>,
    config: &ModelConfig,
    quiet: bool,
) -> Result<RadiationModel> {
    let columns = {
        let _timing = logging::start_timing("load_populations",
            OperationCategory::FileIO { subcategory: FileIOType::DataLoad });
        locations_loader::load_populations(input)
            .with_context(|| format!("failed to read populations from {}", input.display()))?
    };
    info!("Loaded {} population points from {}", columns.len(), input.display());

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(columns.len() as u64)
    };
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")?.progress_chars("=> "),
    );
    bar.set_message("Indexing population");

    let mut progress = |done: usize, _total: usize| bar.set_position(done as u64);
    let index: PopulationIndex = PopulationIndex::build(
        &columns.xs,
        &columns.ys,
        &columns.values,
        config.lookup_policy,
        &mut progress,
    )?;
    bar.finish_and_clear();

    let locations = match locations {
        Some(path) => locations_loader::load_coordinates(path)
            .with_context(|| format!("failed to read locations from {}", path.display()))?,
        None => index.coordinates().to_vec(),
    };

    Ok(RadiationModel::new(index, locations, config)?)
}
