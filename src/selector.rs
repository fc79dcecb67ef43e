//! Per-point placement: bandwidth → neighbourhood → two optimised candidates.
//!
//! Each query gets exactly two starting guesses in the reference space: the
//! affinity-weighted centroid of its positively weighted neighbours and the
//! coordinate of its single highest-affinity neighbour. Both are optimised
//! independently; the winner is the lowest-cost candidate that stayed inside
//! the neighbourhood's triangulation, or the lowest-cost candidate overall
//! (flagged out-of-hull) when neither did.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::bandwidth::BandwidthSolver;
use crate::config::MotionParams;
use crate::core::{Point2, TrainingSet};
use crate::error::{MotionError, Result};
use crate::geometry::Neighbourhood;
use crate::optimizer::{kl_placement_cost, NelderMead, Termination};

/// Which starting guess produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Affinity-weighted centroid of the neighbours.
    WeightedCentroid,
    /// Coordinate of the highest-affinity neighbour.
    MaxAffinity,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 2] = [CandidateKind::WeightedCentroid, CandidateKind::MaxAffinity];

    pub fn index(self) -> usize {
        match self {
            CandidateKind::WeightedCentroid => 0,
            CandidateKind::MaxAffinity => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub guess: Point2,
    pub position: Point2,
    pub cost: f64,
    pub termination: Termination,
    pub in_hull: bool,
}

/// Final decision for one query point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Placement {
    pub position: Point2,
    pub guess: Point2,
    pub cost: f64,
    pub in_hull: bool,
    pub chosen: CandidateKind,
    pub termination: Termination,
    /// Neighbours could not be triangulated; the position is the chosen guess.
    pub degenerate: bool,
}

/// The two starting guesses for neighbour coordinates `z` with weights `w`.
pub fn initial_guesses(z: &[Point2], w: &[f64]) -> [Point2; 2] {
    let mut centroid = [0.0, 0.0];
    let mut best = (0usize, f64::NEG_INFINITY);
    for (i, (c, &wi)) in z.iter().zip(w).enumerate() {
        centroid[0] += wi * c[0];
        centroid[1] += wi * c[1];
        if wi > best.1 {
            best = (i, wi);
        }
    }
    [centroid, z[best.0]]
}

/// Index of the winning candidate and whether it is in-hull.
///
/// Among in-hull candidates the lowest cost wins; with none in-hull the
/// lowest cost overall wins. Ties go to the earlier candidate.
pub fn select_candidate(candidates: &[Candidate]) -> (usize, bool) {
    let lowest = |in_hull_only: bool| {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !in_hull_only || c.in_hull)
            .min_by(|(ia, a), (ib, b)| a.cost.total_cmp(&b.cost).then(ia.cmp(ib)))
            .map(|(i, _)| i)
    };
    match lowest(true) {
        Some(i) => (i, true),
        None => (lowest(false).unwrap_or(0), false),
    }
}

/// Places single query points against a shared training set.
#[derive(Clone, Debug)]
pub struct CandidateSelector<'a> {
    training: &'a TrainingSet,
    solver: BandwidthSolver,
    optimizer: NelderMead,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(training: &'a TrainingSet, solver: BandwidthSolver, optimizer: NelderMead) -> Self {
        Self {
            training,
            solver,
            optimizer,
        }
    }

    pub fn from_params(training: &'a TrainingSet, params: &MotionParams) -> Self {
        Self::new(
            training,
            BandwidthSolver::from_params(params),
            NelderMead::new(params.max_optim_iter),
        )
    }

    /// Place one query from its M-wide divergence (or distance) row.
    pub fn place(&self, distances: &[f64]) -> Result<Placement> {
        if distances.len() != self.training.len() {
            return Err(MotionError::DimensionMismatch {
                expected: self.training.len(),
                got: distances.len(),
            });
        }

        let bandwidth = self.solver.solve(distances)?;
        let (_, z, w) = self.training.positive_neighbours(&bandwidth.p);
        let guesses = initial_guesses(&z, &w);

        let neighbourhood = match Neighbourhood::triangulate(&z) {
            Ok(nb) => Some(nb),
            Err(MotionError::InsufficientNeighborhood(msg)) => {
                debug!("Falling back to guess placement: {}", msg);
                None
            }
            Err(e) => return Err(e),
        };

        let candidates: Vec<Candidate> = CandidateKind::ALL
            .iter()
            .map(|&kind| {
                let guess = guesses[kind.index()];
                let (position, cost, termination) = self.optimizer.place(guess, &z, &w);
                let in_hull = neighbourhood
                    .as_ref()
                    .map(|nb| nb.contains(position))
                    .unwrap_or(false);
                Candidate {
                    kind,
                    guess,
                    position,
                    cost,
                    termination,
                    in_hull,
                }
            })
            .collect();

        let (best, in_hull) = select_candidate(&candidates);
        let chosen = &candidates[best];
        let degenerate = neighbourhood.is_none();
        trace!(
            "Placed point: sigma={:.4e}, neighbours={}, chosen={:?}, in_hull={}, cost={:.6}",
            bandwidth.sigma,
            z.len(),
            chosen.kind,
            in_hull,
            chosen.cost
        );

        // a degenerate placement sits on its guess, so report the cost there
        let (position, cost) = if degenerate {
            (chosen.guess, kl_placement_cost(&chosen.guess, &z, &w))
        } else {
            (chosen.position, chosen.cost)
        };
        Ok(Placement {
            position,
            guess: chosen.guess,
            cost,
            in_hull,
            chosen: chosen.kind,
            termination: chosen.termination,
            degenerate,
        })
    }
}
