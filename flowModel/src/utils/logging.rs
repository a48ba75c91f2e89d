use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};
use tracing_timing::{Builder, Histogram};
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

// Categories for the coarse operation timers
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum OperationCategory {
    IndexBuild,
    PairFlow,
    Calibration,
    FileIO {
        subcategory: FileIOType,
    },
}

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum FileIOType {
    DataLoad,
    ConfigLoad,
    ResultsSave,
}

impl OperationCategory {
    pub fn as_str(&self) -> String {
        match self {
            OperationCategory::IndexBuild => "Index Build".to_string(),
            OperationCategory::PairFlow => "Pair Flow".to_string(),
            OperationCategory::Calibration => "Calibration".to_string(),
            OperationCategory::FileIO { subcategory } => {
                format!("File I/O - {}", match subcategory {
                    FileIOType::DataLoad => "Data Load",
                    FileIOType::ConfigLoad => "Config Load",
                    FileIOType::ResultsSave => "Results Save",
                })
            },
        }
    }
}

const HISTOGRAM_MAX_NS: u64 = 3_600_000_000_000;

fn new_histogram() -> Option<Histogram<u64>> {
    Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NS, 3).ok()
}

lazy_static! {
    static ref TIMING_ENABLED: AtomicBool = AtomicBool::new(false);
    static ref FUNCTION_TIMINGS: Arc<RwLock<HashMap<String, (Duration, usize)>>> = Arc::new(RwLock::new(HashMap::new()));
    static ref CATEGORY_TIMINGS: Arc<RwLock<HashMap<OperationCategory, Histogram<u64>>>> = Arc::new(RwLock::new(HashMap::new()));
}

pub struct TimingGuard {
    function_name: &'static str,
    category: OperationCategory,
    start: Instant,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        record_timing(self.function_name, self.start.elapsed(), &self.category);
    }
}

pub fn start_timing(function_name: &'static str, category: OperationCategory) -> TimingGuard {
    TimingGuard {
        function_name,
        category,
        start: Instant::now(),
    }
}

fn record_timing(function_name: &str, duration: Duration, category: &OperationCategory) {
    if !is_timing_enabled() {
        return;
    }

    {
        let mut timings = FUNCTION_TIMINGS.write();
        let entry = timings
            .entry(function_name.to_string())
            .or_insert((Duration::from_nanos(0), 0));
        entry.0 += duration;
        entry.1 += 1;
    }

    let mut category_timings = CATEGORY_TIMINGS.write();
    if !category_timings.contains_key(category) {
        match new_histogram() {
            Some(histogram) => {
                category_timings.insert(*category, histogram);
            }
            None => return,
        }
    }
    if let Some(histogram) = category_timings.get_mut(category) {
        let _ = histogram.record(duration.as_nanos().min(HISTOGRAM_MAX_NS as u128) as u64);
    }
}

pub fn init_logging(enable_timing: bool, debug: bool) {
    TIMING_ENABLED.store(enable_timing, Ordering::SeqCst);

    let mut env_filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if debug {
        if let Ok(directive) = "radflow=debug".parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let result = if enable_timing {
        let histogram = || {
            Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NS, 3)
                .expect("static histogram bounds are valid")
        };

        let timing_layer = Builder::default().layer(histogram);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(timing_layer.boxed());

        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));

        tracing::subscriber::set_global_default(subscriber)
    };

    if let Err(e) = result {
        eprintln!("Failed to set up tracing subscriber: {}", e);
    }
}

pub fn is_timing_enabled() -> bool {
    TIMING_ENABLED.load(Ordering::SeqCst)
}

pub fn print_timing_report() {
    if !is_timing_enabled() {
        return;
    }

    println!("\nPerformance Report");
    println!("==================");

    println!("\nBy Function:");
    println!("------------");
    let timings = FUNCTION_TIMINGS.read();
    let mut entries: Vec<_> = timings.iter().collect();
    entries.sort_by(|a, b| b.1.0.cmp(&a.1.0));

    for (function_name, (total_duration, count)) in entries {
        let avg_duration = total_duration.div_f64(*count as f64);
        println!(
            "{}: total={:.3}s, count={}, avg={:.3}ms",
            function_name,
            total_duration.as_secs_f64(),
            count,
            avg_duration.as_secs_f64() * 1000.0,
        );
    }

    println!("\nBy Category:");
    println!("------------");
    let category_timings = CATEGORY_TIMINGS.read();
    let mut category_vec: Vec<_> = category_timings.iter().collect();
    category_vec.sort_by(|a, b| {
        let a_total = a.1.mean() * a.1.len() as f64;
        let b_total = b.1.mean() * b.1.len() as f64;
        b_total.total_cmp(&a_total)
    });

    let total_time: f64 = category_vec.iter()
        .map(|(_, hist)| hist.mean() * (hist.len() as f64))
        .sum();

    for (category, histogram) in category_vec {
        let category_total = histogram.mean() * (histogram.len() as f64);
        let percentage = if total_time > 0.0 { (category_total / total_time) * 100.0 } else { 0.0 };
        println!(
            "{}: {:.1}% of total time\n  mean={:.3}ms, p95={:.3}ms, count={}, total={:.3}s",
            category.as_str(),
            percentage,
            histogram.mean() / 1_000_000.0,
            histogram.value_at_quantile(0.95) as f64 / 1_000_000.0,
            histogram.len(),
            category_total / 1_000_000_000.0,
        );
    }

    println!("==================\n");
}
