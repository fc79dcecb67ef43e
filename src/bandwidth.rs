//! Per-query adaptive kernel bandwidth by perplexity matching.
//!
//! For a vector of distances from one query to the M training points, keep
//! the `max_neighbors` smallest and bisect a Gaussian bandwidth `σ` on
//! `[1e-12, max(d)]` until the kernel distribution
//! `p_i ∝ exp(-d_i² / 2σ²)` has perplexity `2^H` (entropy in bits) within
//! `tolerance` of the target.
//!
//! The bisection is bounded by `max_iterations`; running out is reported as
//! [`MotionError::Convergence`] rather than looping forever.

use std::cmp::Ordering;

use log::trace;

use crate::config::MotionParams;
use crate::error::{MotionError, Result};

/// Lower end of the initial bandwidth bracket.
pub const SIGMA_FLOOR: f64 = 1e-12;

/// Solved bandwidth for one query.
#[derive(Clone, Debug)]
pub struct Bandwidth {
    pub sigma: f64,
    /// Perplexity reached by `p`.
    pub perplexity: f64,
    pub iterations: usize,
    /// Full-length affinity vector: zero outside the kept neighbours, sums to 1.
    pub p: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct BandwidthSolver {
    pub perplexity: f64,
    pub tolerance: f64,
    pub max_neighbors: usize,
    pub max_iterations: usize,
}

impl BandwidthSolver {
    pub fn new(perplexity: f64, tolerance: f64, max_neighbors: usize, max_iterations: usize) -> Self {
        Self {
            perplexity,
            tolerance,
            max_neighbors,
            max_iterations,
        }
    }

    pub fn from_params(params: &MotionParams) -> Self {
        Self::new(
            params.perplexity,
            params.sigma_tolerance,
            params.max_neighbors,
            params.max_sigma_iterations,
        )
    }

    pub fn solve(&self, distances: &[f64]) -> Result<Bandwidth> {
        if distances.is_empty() {
            return Err(MotionError::EmptyInput("distance vector".to_string()));
        }

        let high_start = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut high = high_start;
        let mut low = SIGMA_FLOOR;
        let mut sigma = 0.5 * (high + low);
        if !sigma.is_finite() || distances.iter().any(|d| d.is_nan()) {
            return Err(MotionError::NumericDegeneracy(format!(
                "starting sigma is {}, high guess is {} and low guess is {}",
                sigma, high, low
            )));
        }

        // stable argsort, keep the nearest max_neighbors
        let mut order: Vec<usize> = (0..distances.len()).collect();
        order.sort_by(|&a, &b| {
            distances[a]
                .partial_cmp(&distances[b])
                .unwrap_or(Ordering::Equal)
        });
        order.truncate(self.max_neighbors.min(distances.len()));
        let kept: Vec<f64> = order.iter().map(|&i| distances[i]).collect();

        let (mut p, mut perplexity) = kernel_distribution(&kept, sigma);
        let mut iterations = 0;

        while (perplexity - self.perplexity).abs() >= self.tolerance {
            if iterations >= self.max_iterations {
                return Err(MotionError::Convergence {
                    iterations,
                    perplexity,
                    target: self.perplexity,
                });
            }
            if perplexity > self.perplexity {
                high = sigma;
            } else {
                low = sigma;
            }
            sigma = 0.5 * (high + low);
            (p, perplexity) = kernel_distribution(&kept, sigma);
            iterations += 1;
        }

        trace!(
            "Bandwidth solved: sigma={:.6e}, perplexity={:.6}, iterations={}",
            sigma,
            perplexity,
            iterations
        );

        let mut out = vec![0.0; distances.len()];
        for (&i, &pi) in order.iter().zip(&p) {
            out[i] = pi;
        }
        Ok(Bandwidth {
            sigma,
            perplexity,
            iterations,
            p: out,
        })
    }
}

/// Normalised Gaussian kernel over `kept` distances and its perplexity.
///
/// Exponents are shifted by the smallest distance, which leaves the
/// normalised distribution unchanged and keeps it from underflowing.
pub fn kernel_distribution(kept: &[f64], sigma: f64) -> (Vec<f64>, f64) {
    let d_min = kept.iter().copied().fold(f64::INFINITY, f64::min);
    let two_s2 = 2.0 * sigma * sigma;
    let mut p: Vec<f64> = kept
        .iter()
        .map(|&d| (-(d * d - d_min * d_min) / two_s2).exp())
        .collect();
    let sum: f64 = p.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for v in p.iter_mut() {
            *v /= sum;
        }
    }
    let perplexity = perplexity_of(&p);
    (p, perplexity)
}

/// `2^H` with `H` the Shannon entropy in bits of the positive entries.
pub fn perplexity_of(p: &[f64]) -> f64 {
    let h: f64 = p
        .iter()
        .filter(|&&x| x > 0.0)
        .map(|&x| -x * x.log2())
        .sum();
    h.exp2()
}
