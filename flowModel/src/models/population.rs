//! Population aggregation over a spatial index.
//!
//! `PopulationIndex` owns a point locator over every indexed coordinate together with the
//! population weight stored at that coordinate. It answers the two questions the radiation
//! model needs: the population at a point, and the total population inside a circle.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::model_config::LookupPolicy;
use crate::data::poi::{Coordinate, POI};
use crate::error::{RadiationError, Result};
use crate::utils::logging::{self, OperationCategory};
use crate::utils::spatial_index::{PointLocator, QuadTree};
use crate::utils::traits::{BuildProgress, NoProgress};

#[derive(Debug, Clone)]
pub struct PopulationIndex<L: PointLocator = QuadTree> {
    locator: L,
    coords: Vec<Coordinate>,
    values: Vec<f64>,
    lookup: HashMap<(u64, u64), usize>,
    total: f64,
    policy: LookupPolicy,
}

impl PopulationIndex<QuadTree> {
    /// Build a quadtree-backed index with the default (nearest-match) lookup policy.
    pub fn new(xs: &[f64], ys: &[f64], values: &[f64]) -> Result<Self> {
        Self::build(xs, ys, values, LookupPolicy::default(), &mut NoProgress)
    }

    pub fn from_locations<P: POI>(locations: &[P]) -> Result<Self> {
        let xs: Vec<f64> = locations.iter().map(|l| l.get_coordinate().x).collect();
        let ys: Vec<f64> = locations.iter().map(|l| l.get_coordinate().y).collect();
        let values: Vec<f64> = locations.iter().map(|l| l.get_population()).collect();
        Self::new(&xs, &ys, &values)
    }
}

impl<L: PointLocator> PopulationIndex<L> {
    /// Validate the parallel input lists and build the locator.
    ///
    /// Fails on mismatched lengths, non-finite values, negative populations and duplicate
    /// coordinates. Nothing is indexed unless every row is valid.
    pub fn build(
        xs: &[f64],
        ys: &[f64],
        values: &[f64],
        policy: LookupPolicy,
        progress: &mut dyn BuildProgress,
    ) -> Result<Self> {
        let _timing = logging::start_timing("PopulationIndex::build", OperationCategory::IndexBuild);

        if xs.len() != ys.len() || xs.len() != values.len() {
            return Err(RadiationError::LengthMismatch {
                xs: xs.len(),
                ys: ys.len(),
                values: values.len(),
            });
        }

        let mut coords = Vec::with_capacity(xs.len());
        let mut lookup = HashMap::with_capacity(xs.len());
        for (index, ((&x, &y), &value)) in xs.iter().zip(ys).zip(values).enumerate() {
            let coordinate = Coordinate::new(x, y);
            if !coordinate.is_finite() {
                return Err(RadiationError::NonFiniteInput { field: "coordinate", index });
            }
            if !value.is_finite() {
                return Err(RadiationError::NonFiniteInput { field: "population", index });
            }
            if value < 0.0 {
                return Err(RadiationError::NegativePopulation { index, value });
            }
            if lookup.insert(coordinate.key(), index).is_some() {
                return Err(RadiationError::DuplicateCoordinate { index, x, y });
            }
            coords.push(coordinate);
        }

        let locator = L::build_with_progress(&coords, progress);
        let total: f64 = values.iter().sum();

        info!(
            "Built population index over {} points (total population {:.1})",
            coords.len(),
            total
        );

        Ok(PopulationIndex {
            locator,
            coords,
            values: values.to_vec(),
            lookup,
            total,
            policy,
        })
    }

    pub fn with_policy(mut self, policy: LookupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LookupPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// N, the sum of every population weight.
    pub fn total_population(&self) -> f64 {
        self.total
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn value_of(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Index of the point a coordinate resolves to under the lookup policy.
    pub fn resolve(&self, coordinate: &Coordinate) -> Result<usize> {
        if let Some(&index) = self.lookup.get(&coordinate.key()) {
            return Ok(index);
        }
        if self.is_empty() {
            return Err(RadiationError::EmptyIndex);
        }

        match self.policy {
            LookupPolicy::Exact => Err(RadiationError::Lookup {
                x: coordinate.x,
                y: coordinate.y,
            }),
            LookupPolicy::Nearest => {
                let index = self.locator.nearest(coordinate).ok_or(RadiationError::EmptyIndex)?;
                let substitute = &self.coords[index];
                debug!(
                    "No population at ({}, {}); using nearest point ({}, {})",
                    coordinate.x, coordinate.y, substitute.x, substitute.y
                );
                Ok(index)
            }
        }
    }

    /// Population at a coordinate, exact or nearest-match depending on the policy.
    pub fn value_at(&self, coordinate: &Coordinate) -> Result<f64> {
        self.resolve(coordinate).map(|index| self.values[index])
    }

    /// Individual populations of every point within `radius`, in index order.
    pub fn values_within_radius(&self, coordinate: &Coordinate, radius: f64) -> Vec<f64> {
        self.locator
            .within_radius(coordinate, radius)
            .into_iter()
            .map(|index| self.values[index])
            .collect()
    }

    /// Total population of every point at distance <= `radius`, the centre included.
    pub fn total_within_radius(&self, coordinate: &Coordinate, radius: f64) -> f64 {
        self.locator
            .within_radius(coordinate, radius)
            .into_iter()
            .map(|index| self.values[index])
            .sum()
    }

    /// Population of the circle centred on `origin` that reaches `destination`.
    pub fn total_between(&self, origin: &Coordinate, destination: &Coordinate) -> f64 {
        let radius = origin.distance_to(destination);
        self.total_within_radius(origin, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::spatial_index::LinearScan;
    use crate::Location;

    fn five_points() -> PopulationIndex {
        PopulationIndex::new(
            &[0.0, 1.0, 3.0, 0.0, 2.0],
            &[0.0, 0.0, 0.0, 2.0, 2.0],
            &[10.0, 5.0, 2.0, 7.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_exact_lookup_returns_stored_value() {
        let index = five_points();
        assert_eq!(index.value_at(&Coordinate::new(3.0, 0.0)).unwrap(), 2.0);
        assert_eq!(index.value_at(&Coordinate::new(0.0, 2.0)).unwrap(), 7.0);
        assert_eq!(index.total_population(), 25.0);
    }

    #[test]
    fn test_nearest_policy_substitutes_closest_value() {
        let index = five_points();
        assert_eq!(index.policy(), LookupPolicy::Nearest);
        // (2.6, 0.3) is closest to (3, 0)
        assert_eq!(index.value_at(&Coordinate::new(2.6, 0.3)).unwrap(), 2.0);
    }

    #[test]
    fn test_exact_policy_fails_on_miss() {
        let index = five_points().with_policy(LookupPolicy::Exact);
        assert!(matches!(
            index.value_at(&Coordinate::new(2.6, 0.3)),
            Err(RadiationError::Lookup { .. })
        ));
        assert_eq!(index.value_at(&Coordinate::new(1.0, 0.0)).unwrap(), 5.0);
    }

    #[test]
    fn test_total_within_radius_includes_centre() {
        let index = five_points();
        assert_eq!(index.total_within_radius(&Coordinate::new(0.0, 0.0), 0.0), 10.0);
        assert_eq!(index.total_within_radius(&Coordinate::new(0.0, 0.0), 1.0), 15.0);
        assert_eq!(index.total_within_radius(&Coordinate::new(0.0, 0.0), 2.0), 22.0);
        assert_eq!(index.values_within_radius(&Coordinate::new(0.0, 0.0), 2.0), vec![10.0, 5.0, 7.0]);
    }

    #[test]
    fn test_total_between_covers_both_endpoints() {
        let index = five_points();
        let coords = index.coordinates().to_vec();
        for a in 0..coords.len() {
            for b in 0..coords.len() {
                if a == b {
                    continue;
                }
                let total = index.total_between(&coords[a], &coords[b]);
                assert!(total >= index.value_of(a) + index.value_of(b));
            }
        }
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            PopulationIndex::new(&[0.0, 1.0], &[0.0], &[1.0, 2.0]),
            Err(RadiationError::LengthMismatch { .. })
        ));
        assert!(matches!(
            PopulationIndex::new(&[0.0, 1.0], &[0.0, 0.0], &[1.0, -2.0]),
            Err(RadiationError::NegativePopulation { index: 1, .. })
        ));
        assert!(matches!(
            PopulationIndex::new(&[0.0, f64::NAN], &[0.0, 0.0], &[1.0, 2.0]),
            Err(RadiationError::NonFiniteInput { field: "coordinate", index: 1 })
        ));
        assert!(matches!(
            PopulationIndex::new(&[1.0, 1.0], &[2.0, 2.0], &[1.0, 2.0]),
            Err(RadiationError::DuplicateCoordinate { index: 1, .. })
        ));
    }

    #[test]
    fn test_from_locations_matches_parallel_lists() {
        let locations = vec![
            Location::new(0.0, 0.0, 10.0),
            Location::new(1.0, 0.0, 5.0),
            Location::new(3.0, 0.0, 2.0),
        ];
        let index = PopulationIndex::from_locations(&locations).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.total_population(), 17.0);
        assert_eq!(index.value_at(&Coordinate::new(3.0, 0.0)).unwrap(), 2.0);

        let bad = vec![Location::new(0.0, 0.0, 1.0), Location::new(0.0, 0.0, 2.0)];
        assert!(matches!(
            PopulationIndex::from_locations(&bad),
            Err(RadiationError::DuplicateCoordinate { index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_index_lookup() {
        let index = PopulationIndex::new(&[], &[], &[]).unwrap();
        assert!(matches!(index.value_at(&Coordinate::new(0.0, 0.0)), Err(RadiationError::EmptyIndex)));
        assert_eq!(index.total_within_radius(&Coordinate::new(0.0, 0.0), 10.0), 0.0);
    }

    #[test]
    fn test_linear_scan_backend_agrees() {
        let xs = [0.0, 1.0, 3.0, 0.0, 2.0];
        let ys = [0.0, 0.0, 0.0, 2.0, 2.0];
        let vals = [10.0, 5.0, 2.0, 7.0, 1.0];
        let scan: PopulationIndex<LinearScan> =
            PopulationIndex::build(&xs, &ys, &vals, LookupPolicy::Nearest, &mut NoProgress).unwrap();
        let tree = five_points();
        let q = Coordinate::new(0.5, 0.5);
        assert_eq!(scan.total_within_radius(&q, 1.6), tree.total_within_radius(&q, 1.6));
        assert_eq!(scan.value_at(&q).unwrap(), tree.value_at(&q).unwrap());
    }
}
