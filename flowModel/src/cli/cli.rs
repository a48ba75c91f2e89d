use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::model_config::LookupPolicy;

#[derive(Parser)]
#[command(author, version, about = "Radiation-model trip flow estimation", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "JSON model configuration")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Policy for coordinates missing from the population index")]
    lookup: Option<LookupArg>,

    #[arg(long, global = true, default_value_t = false)]
    enable_timing: bool,

    #[arg(long, global = true, default_value_t = false)]
    debug_logging: bool,

    #[arg(long, global = true, default_value_t = false, help = "Hide the index build progress bar")]
    quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Estimate flows for every location pair from a global mover count
    Flows {
        #[arg(short, long, help = "CSV with x,y,population columns")]
        input: PathBuf,

        #[arg(short, long, help = "CSV with x,y columns; defaults to every input point")]
        locations: Option<PathBuf>,

        #[arg(short = 'n', long, help = "Total number of movers (Nc)")]
        total_movers: Option<f64>,

        #[arg(short, long, default_value = "flows.csv")]
        output: PathBuf,
    },
    /// Solve for self-consistent per-location outflows
    Calibrate {
        #[arg(short, long, help = "CSV with x,y,population columns")]
        input: PathBuf,

        #[arg(short, long, help = "CSV with x,y columns; defaults to every input point")]
        locations: Option<PathBuf>,

        #[arg(short, long, default_value = "outflows.csv")]
        output: PathBuf,

        #[arg(long, help = "Override the optimizer iteration budget")]
        max_iterations: Option<usize>,

        #[arg(short, long, default_value_t = false, help = "Evaluate pair flows on all cores")]
        parallel: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LookupArg {
    Nearest,
    Exact,
}

impl From<LookupArg> for LookupPolicy {
    fn from(arg: LookupArg) -> Self {
        match arg {
            LookupArg::Nearest => LookupPolicy::Nearest,
            LookupArg::Exact => LookupPolicy::Exact,
        }
    }
}

impl Args {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn config(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn lookup(&self) -> Option<LookupPolicy> {
        self.lookup.map(LookupPolicy::from)
    }

    pub fn enable_timing(&self) -> bool {
        self.enable_timing
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }
}
