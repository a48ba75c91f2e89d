//! Radiation model of mobility.
//!
//! The expected flow from origin `i` to destination `j` is
//!
//! ```text
//! T_ij = T_i * (m_i * n_j) / ((m_i + s_ij) * (m_i + n_j + s_ij))
//! ```
//!
//! where `m_i` and `n_j` are the endpoint populations, `s_ij` the population inside the circle
//! centred on `i` that reaches `j` (endpoints excluded) and `T_i` the total outflow of `i`.
//! See Simini et al. 2012 and Kang et al. 2015.

use std::collections::HashSet;
use std::iter::FusedIterator;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::model_config::ModelConfig;
use crate::data::poi::Coordinate;
use crate::error::{RadiationError, Result};
use crate::models::population::PopulationIndex;
use crate::utils::logging::{self, OperationCategory};
use crate::utils::spatial_index::{PointLocator, QuadTree};
use crate::utils::traits::NoProgress;

/// Radiation model family. Only `Basic` has a formula; the others are reserved tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    #[default]
    Basic,
    ProductionIntervention,
    AttractionIntervention,
    AttractionCompetition,
    Generalized,
}

impl ModelVariant {
    pub fn is_implemented(&self) -> bool {
        matches!(self, ModelVariant::Basic)
    }
}

/// Expected flow for one origin/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairFlow {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub flow: f64,
}

/// The radiation formula. A zero denominator yields 0 rather than NaN or infinity.
pub fn radiation_flow(outflow: f64, m_i: f64, n_j: f64, s_ij: f64) -> f64 {
    let near = m_i + s_ij;
    let far = m_i + n_j + s_ij;
    if near == 0.0 || far == 0.0 {
        return 0.0;
    }
    outflow * ((m_i * n_j) / (near * far))
}

pub struct RadiationModel<L: PointLocator = QuadTree> {
    index: PopulationIndex<L>,
    locations: Vec<Coordinate>,
    populations: Vec<f64>, // Resolved population of each location
    total_movers: Option<f64>,
}

impl RadiationModel<QuadTree> {
    /// Index the given populations and use every indexed point as a location.
    pub fn from_populations(xs: &[f64], ys: &[f64], values: &[f64], config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let index = PopulationIndex::build(xs, ys, values, config.lookup_policy, &mut NoProgress)?;
        let locations = index.coordinates().to_vec();
        Self::new(index, locations, config)
    }
}

impl<L: PointLocator> RadiationModel<L> {
    /// Locations must be finite and distinct. Every location is resolved against the index here,
    /// so a lookup failure surfaces before any flow is computed.
    pub fn new(index: PopulationIndex<L>, locations: Vec<Coordinate>, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        if !config.variant.is_implemented() {
            return Err(RadiationError::NotImplemented(config.variant));
        }
        validate_locations(&locations)?;

        let index = index.with_policy(config.lookup_policy);
        let populations = locations
            .iter()
            .map(|loc| index.value_at(loc))
            .collect::<Result<Vec<f64>>>()?;

        info!(
            "Radiation model over {} locations (N = {:.1}, Nc = {})",
            locations.len(),
            index.total_population(),
            config.total_movers.map_or("unset".to_string(), |nc| format!("{:.1}", nc))
        );

        Ok(RadiationModel {
            index,
            locations,
            populations,
            total_movers: config.total_movers,
        })
    }

    pub fn index(&self) -> &PopulationIndex<L> {
        &self.index
    }

    pub fn locations(&self) -> &[Coordinate] {
        &self.locations
    }

    pub fn populations(&self) -> &[f64] {
        &self.populations
    }

    pub fn total_movers(&self) -> Option<f64> {
        self.total_movers
    }

    pub fn total_population(&self) -> f64 {
        self.index.total_population()
    }

    /// Number of unordered location pairs, n(n-1)/2.
    pub fn pair_count(&self) -> usize {
        let n = self.locations.len();
        n * n.saturating_sub(1) / 2
    }

    fn share_of_movers(&self, m_i: f64) -> Result<f64> {
        let nc = self.total_movers.ok_or(RadiationError::MissingTotalMovers)?;
        let n = self.index.total_population();
        if n == 0.0 {
            return Ok(0.0);
        }
        Ok(m_i * (nc / n))
    }

    /// T_i = m_i * Nc / N for the population found at `origin`.
    pub fn num_commuters_starting_at(&self, origin: &Coordinate) -> Result<f64> {
        let m_i = self.index.value_at(origin)?;
        self.share_of_movers(m_i)
    }

    /// Global outflow of every location, in location order.
    pub fn default_outflows(&self) -> Result<Vec<f64>> {
        self.populations.iter().map(|&m| self.share_of_movers(m)).collect()
    }

    /// Flow between two arbitrary coordinates.
    ///
    /// `override_outflow` replaces `T_i`; without it the global Nc must be configured.
    pub fn compute_pair(
        &self,
        origin: &Coordinate,
        destination: &Coordinate,
        override_outflow: Option<f64>,
    ) -> Result<PairFlow> {
        let m_i = self.index.value_at(origin)?;
        let n_j = self.index.value_at(destination)?;
        let outflow = match override_outflow {
            Some(outflow) => outflow,
            None => self.share_of_movers(m_i)?,
        };
        Ok(self.flow_between(origin, destination, m_i, n_j, outflow))
    }

    fn flow_between(&self, origin: &Coordinate, destination: &Coordinate, m_i: f64, n_j: f64, outflow: f64) -> PairFlow {
        let circle = self.index.total_between(origin, destination);
        let s_ij = (circle - m_i - n_j).max(0.0);
        PairFlow {
            origin: *origin,
            destination: *destination,
            flow: radiation_flow(outflow, m_i, n_j, s_ij),
        }
    }

    /// Flow between locations `i` and `j` (positions in the location list).
    pub fn pair_flow(&self, i: usize, j: usize, outflow: f64) -> PairFlow {
        self.flow_between(
            &self.locations[i],
            &self.locations[j],
            self.populations[i],
            self.populations[j],
            outflow,
        )
    }

    /// Every unordered pair under the global Nc.
    pub fn run_all(&self) -> Result<PairFlows<'_, L>> {
        let outflows = self.default_outflows()?;
        debug!("Enumerating {} location pairs", self.pair_count());
        Ok(PairFlows::new(self, outflows))
    }

    /// Every unordered pair, with `outflows[i]` used as the origin outflow of location `i`.
    pub fn run_with_outflows(&self, outflows: &[f64]) -> Result<PairFlows<'_, L>> {
        self.check_outflows(outflows)?;
        Ok(PairFlows::new(self, outflows.to_vec()))
    }

    /// Directed flows from one location to every other location.
    pub fn flows_from(
        &self,
        origin: usize,
        override_outflow: Option<f64>,
    ) -> Result<impl Iterator<Item = PairFlow> + '_> {
        if origin >= self.locations.len() {
            return Err(RadiationError::IndexOutOfRange {
                index: origin,
                len: self.locations.len(),
            });
        }
        let outflow = match override_outflow {
            Some(outflow) => outflow,
            None => self.share_of_movers(self.populations[origin])?,
        };
        Ok((0..self.locations.len())
            .filter(move |&j| j != origin)
            .map(move |j| self.pair_flow(origin, j, outflow)))
    }

    /// Sum of the flows each location sends, over the same pairs `run_all` enumerates.
    ///
    /// Each origin's total is accumulated sequentially in pair order, so the parallel and
    /// sequential paths give identical results.
    pub fn predicted_outflows(&self, outflows: &[f64], parallel: bool) -> Result<Vec<f64>> {
        self.check_outflows(outflows)?;
        let _timing = logging::start_timing("RadiationModel::predicted_outflows", OperationCategory::PairFlow);

        let row_total = |i: usize| -> f64 {
            (i + 1..self.locations.len())
                .map(|j| self.pair_flow(i, j, outflows[i]).flow)
                .sum()
        };

        let totals: Vec<f64> = if parallel {
            (0..self.locations.len()).into_par_iter().map(row_total).collect()
        } else {
            (0..self.locations.len()).map(row_total).collect()
        };
        Ok(totals)
    }

    fn check_outflows(&self, outflows: &[f64]) -> Result<()> {
        if outflows.len() != self.locations.len() {
            return Err(RadiationError::InvalidConfig(format!(
                "expected {} outflows, got {}",
                self.locations.len(),
                outflows.len()
            )));
        }
        Ok(())
    }
}

fn validate_locations(locations: &[Coordinate]) -> Result<()> {
    let mut seen = HashSet::with_capacity(locations.len());
    for (index, location) in locations.iter().enumerate() {
        if !location.is_finite() {
            return Err(RadiationError::NonFiniteInput { field: "location", index });
        }
        if !seen.insert(location.key()) {
            return Err(RadiationError::DuplicateCoordinate {
                index,
                x: location.x,
                y: location.y,
            });
        }
    }
    Ok(())
}

/// Aggregate flows by origin coordinate, in order of first appearance.
pub fn outflow_totals<I: IntoIterator<Item = PairFlow>>(flows: I) -> Vec<(Coordinate, f64)> {
    let mut totals: Vec<(Coordinate, f64)> = Vec::new();
    let mut positions = std::collections::HashMap::new();
    for pair in flows {
        let slot = *positions.entry(pair.origin.key()).or_insert_with(|| {
            totals.push((pair.origin, 0.0));
            totals.len() - 1
        });
        totals[slot].1 += pair.flow;
    }
    totals
}

/// Lazy, single-pass sequence of unordered pair flows.
///
/// Pairs come in combinatorial order over the location list: (0,1), (0,2), ..., (1,2), ...
/// Once consumed the sequence is exhausted; collect it when it must be read twice.
pub struct PairFlows<'a, L: PointLocator = QuadTree> {
    model: &'a RadiationModel<L>,
    outflows: Vec<f64>,
    i: usize,
    j: usize,
    remaining: usize,
}

impl<'a, L: PointLocator> PairFlows<'a, L> {
    fn new(model: &'a RadiationModel<L>, outflows: Vec<f64>) -> Self {
        PairFlows {
            remaining: model.pair_count(),
            model,
            outflows,
            i: 0,
            j: 1,
        }
    }
}

impl<L: PointLocator> Iterator for PairFlows<'_, L> {
    type Item = PairFlow;

    fn next(&mut self) -> Option<PairFlow> {
        if self.remaining == 0 {
            return None;
        }
        let (i, j) = (self.i, self.j);
        self.j += 1;
        if self.j == self.model.locations.len() {
            self.i += 1;
            self.j = self.i + 1;
        }
        self.remaining -= 1;
        Some(self.model.pair_flow(i, j, self.outflows[i]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<L: PointLocator> ExactSizeIterator for PairFlows<'_, L> {}

impl<L: PointLocator> FusedIterator for PairFlows<'_, L> {}
