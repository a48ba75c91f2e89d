//! End-to-end checks of the public flow-model API.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use radflow::core::radiation::radiation_flow;
use radflow::data::locations_loader;
use radflow::utils::csv_export;
use radflow::{
    CalibrationConfig, CalibrationEngine, Coordinate, LookupPolicy, ModelConfig, PopulationIndex,
    RadiationError, RadiationModel,
};

fn abc_model() -> RadiationModel {
    RadiationModel::from_populations(
        &[0.0, 1.0, 3.0],
        &[0.0, 0.0, 0.0],
        &[10.0, 5.0, 2.0],
        &ModelConfig::with_total_movers(10.0),
    )
    .unwrap()
}

fn random_model(n: usize, seed: u64, total_movers: Option<f64>) -> RadiationModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let xs: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..100.0)).collect();
    let ys: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..100.0)).collect();
    // Some zero populations on purpose
    let values: Vec<f64> = (0..n)
        .map(|i| if i % 7 == 0 { 0.0 } else { rng.gen_range(1.0..5_000.0) })
        .collect();
    let config = ModelConfig {
        total_movers,
        ..ModelConfig::default()
    };
    RadiationModel::from_populations(&xs, &ys, &values, &config).unwrap()
}

#[test]
fn test_commuters_starting_at_population_share() {
    let model = abc_model();
    let t_a = model.num_commuters_starting_at(&Coordinate::new(0.0, 0.0)).unwrap();
    assert!((t_a - 5.882).abs() < 1e-3);
    assert_eq!(model.total_population(), 17.0);
}

#[test]
fn test_total_between_includes_endpoints() {
    let model = abc_model();
    let a = Coordinate::new(0.0, 0.0);
    let b = Coordinate::new(1.0, 0.0);
    let total = model.index().total_between(&a, &b);
    assert!(total >= 15.0);
    let s_ab = (total - 10.0 - 5.0).max(0.0);
    assert_eq!(s_ab, 0.0);
}

#[test]
fn test_zero_populations_give_zero_flow() {
    let model = RadiationModel::from_populations(
        &[0.0, 1.0, 0.5],
        &[0.0, 0.0, 0.1],
        &[0.0, 0.0, 50.0],
        &ModelConfig::with_total_movers(100.0),
    )
    .unwrap();
    let pair = model
        .compute_pair(&Coordinate::new(0.0, 0.0), &Coordinate::new(1.0, 0.0), Some(25.0))
        .unwrap();
    assert_eq!(pair.flow, 0.0);
    assert!(pair.flow.is_finite());
}

#[test]
fn test_nearest_lookup_matches_brute_force() {
    let xs = [0.0, 4.0, 9.0, 2.0, 7.5];
    let ys = [0.0, 1.0, 3.0, 8.0, 6.0];
    let vals = [11.0, 22.0, 33.0, 44.0, 55.0];
    let index = PopulationIndex::new(&xs, &ys, &vals).unwrap();

    for i in 0..xs.len() {
        assert_eq!(index.value_at(&Coordinate::new(xs[i], ys[i])).unwrap(), vals[i]);
    }

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let q = Coordinate::new(rng.gen_range(-2.0..12.0), rng.gen_range(-2.0..10.0));
        let brute = (0..xs.len())
            .min_by(|&a, &b| {
                let da = q.distance_to(&Coordinate::new(xs[a], ys[a]));
                let db = q.distance_to(&Coordinate::new(xs[b], ys[b]));
                da.total_cmp(&db)
            })
            .unwrap();
        assert_eq!(index.value_at(&q).unwrap(), vals[brute]);
    }

    let exact = index.with_policy(LookupPolicy::Exact);
    assert!(matches!(
        exact.value_at(&Coordinate::new(0.5, 0.5)),
        Err(RadiationError::Lookup { .. })
    ));
}

#[test]
fn test_symmetric_calibration_converges() {
    let model = RadiationModel::from_populations(
        &[0.0, 10.0, 0.0, 10.0],
        &[0.0, 0.0, 10.0, 10.0],
        &[250.0, 250.0, 250.0, 250.0],
        &ModelConfig::default(),
    )
    .unwrap();
    let engine = CalibrationEngine::new(&model, CalibrationConfig::default()).unwrap();
    let result = engine.calibrate().unwrap();

    assert!(result.converged);
    assert_eq!(result.outflows.len(), 4);
    assert!(result.mean_squared_error < 1e-6);
    for (i, &t) in result.outflows.iter().enumerate() {
        let predicted: f64 = (i + 1..4).map(|j| model.pair_flow(i, j, t).flow).sum();
        assert!((predicted - t).abs() <= 0.01 * t.abs().max(1.0));
    }
}

#[test]
fn test_random_model_calibration_converges() {
    for (n, seed) in [(20usize, 1u64), (25, 1), (25, 7)] {
        let model = random_model(n, seed, None);
        let engine = CalibrationEngine::new(&model, CalibrationConfig::default()).unwrap();
        let result = engine.calibrate().unwrap();

        assert!(result.converged, "n = {}, seed = {}", n, seed);
        assert!(result.iterations < CalibrationConfig::default().max_iterations);
        assert!(result.mean_squared_error < 1e-6);
        assert!(result.outflows.iter().all(|&t| t >= 0.0));
        assert!(result.max_relative_error(1.0) <= 0.01);
    }
}

#[test]
fn test_pair_enumeration_is_complete_and_unique() {
    for n in [0usize, 1, 2, 5, 23] {
        let model = random_model(n, n as u64 + 1, Some(1_000.0));
        let flows: Vec<_> = model.run_all().unwrap().collect();
        assert_eq!(flows.len(), n * n.saturating_sub(1) / 2);

        let mut seen = HashSet::new();
        for pair in &flows {
            assert_ne!(pair.origin, pair.destination);
            let key = if pair.origin.key() < pair.destination.key() {
                (pair.origin.key(), pair.destination.key())
            } else {
                (pair.destination.key(), pair.origin.key())
            };
            assert!(seen.insert(key));
        }
    }
}

#[test]
fn test_flows_are_non_negative_and_zero_for_empty_endpoints() {
    let model = random_model(60, 9, Some(20_000.0));
    let populations = model.populations().to_vec();
    let locations = model.locations().to_vec();
    for pair in model.run_all().unwrap() {
        assert!(pair.flow >= 0.0 && pair.flow.is_finite());
        let i = locations.iter().position(|c| *c == pair.origin).unwrap();
        let j = locations.iter().position(|c| *c == pair.destination).unwrap();
        if populations[i] == 0.0 || populations[j] == 0.0 {
            assert_eq!(pair.flow, 0.0);
        }
        let circle = model.index().total_between(&pair.origin, &pair.destination);
        assert!(circle + 1e-9 >= populations[i] + populations[j]);
    }
}

#[test]
fn test_intervening_population_clamp() {
    // A circle total smaller than the endpoints would make s negative without the clamp
    let clamped = (10.0_f64 - 8.0 - 5.0).max(0.0);
    assert_eq!(clamped, 0.0);
    let flow = radiation_flow(6.0, 8.0, 5.0, clamped);
    assert!((flow - 6.0 * 40.0 / (8.0 * 13.0)).abs() < 1e-12);
}

#[test]
fn test_run_all_is_deterministic() {
    let model = random_model(40, 17, Some(5_000.0));
    let first: Vec<_> = model.run_all().unwrap().collect();
    let second: Vec<_> = model.run_all().unwrap().collect();
    assert_eq!(first, second);
}

#[test]
fn test_parallel_objective_matches_sequential() {
    let model = random_model(30, 23, None);
    let sequential = CalibrationEngine::new(&model, CalibrationConfig::default()).unwrap();
    let parallel = CalibrationEngine::new(
        &model,
        CalibrationConfig {
            parallel: true,
            ..CalibrationConfig::default()
        },
    )
    .unwrap();
    let guess = sequential.initial_guess();
    assert_eq!(sequential.objective(&guess).unwrap(), parallel.objective(&guess).unwrap());
}

#[test]
fn test_explicit_locations_resolve_before_any_flow() {
    let index = PopulationIndex::new(&[0.0, 5.0, 9.0], &[0.0, 5.0, 0.0], &[3.0, 4.0, 5.0]).unwrap();
    let config = ModelConfig {
        total_movers: Some(12.0),
        lookup_policy: LookupPolicy::Exact,
        ..ModelConfig::default()
    };
    let result = RadiationModel::new(
        index,
        vec![Coordinate::new(0.0, 0.0), Coordinate::new(4.0, 4.0)],
        &config,
    );
    assert!(matches!(result, Err(RadiationError::Lookup { x, y }) if x == 4.0 && y == 4.0));
}

#[test]
fn test_csv_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pops.csv");
    std::fs::write(&input, "x,y,population\n0,0,10\n1,0,5\n3,0,2\n").unwrap();

    let columns = locations_loader::load_populations(&input).unwrap();
    let model = RadiationModel::from_populations(
        &columns.xs,
        &columns.ys,
        &columns.values,
        &ModelConfig::with_total_movers(10.0),
    )
    .unwrap();

    let output = dir.path().join("flows.csv");
    let rows = csv_export::export_flows(&output, model.run_all().unwrap()).unwrap();
    assert_eq!(rows, 3);

    let text = std::fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.starts_with("origin_x,origin_y,destination_x,destination_y,flow"));
}

#[test]
fn test_loaded_locations_reject_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locs.csv");
    std::fs::write(&path, "x,y\n0,0\n3,0\n0,0\n").unwrap();

    let index = PopulationIndex::new(&[0.0, 1.0, 3.0], &[0.0, 0.0, 0.0], &[10.0, 5.0, 2.0]).unwrap();
    let locations = locations_loader::load_coordinates(&path).unwrap();
    let result = RadiationModel::new(index, locations, &ModelConfig::with_total_movers(10.0));
    match result {
        Err(e) => {
            assert!(matches!(e, RadiationError::DuplicateCoordinate { index: 2, .. }));
            assert!(e.is_configuration());
        }
        Ok(_) => panic!("repeated location accepted"),
    }
}
