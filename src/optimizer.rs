//! Derivative-free local optimisation of the placement cost.
//!
//! The cost of placing a query at `x` against its neighbours' reference
//! coordinates `z_i` and affinities `p_i` is
//!
//! ```text
//! cost(x) = ln Σ 1/(1 + |x − z_i|²) + Σ p_i ln(1 + |x − z_i|²)
//! ```
//!
//! i.e. the KL divergence between `p` and the Student-t similarities of `x`,
//! up to a constant. It is minimised with a Nelder-Mead simplex search.

use std::cell::Cell;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::Point2;

/// Placement cost of `x` given neighbour coordinates and their affinities.
pub fn kl_placement_cost(x: &[f64], neighbours: &[Point2], p: &[f64]) -> f64 {
    let mut q_sum = 0.0;
    let mut cross = 0.0;
    for (z, &w) in neighbours.iter().zip(p) {
        let d = (x[0] - z[0]).powi(2) + (x[1] - z[1]).powi(2);
        q_sum += 1.0 / (1.0 + d);
        cross += w * d.ln_1p();
    }
    q_sum.ln() + cross
}

/// Why the simplex search stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Converged,
    MaxEvaluations,
    MaxIterations,
}

impl Termination {
    /// Numeric exit flag: 0 converged, 1 evaluation limit, 2 iteration limit.
    pub fn code(self) -> u8 {
        match self {
            Termination::Converged => 0,
            Termination::MaxEvaluations => 1,
            Termination::MaxIterations => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Nelder-Mead simplex search with the standard coefficients.
#[derive(Clone, Debug)]
pub struct NelderMead {
    pub max_iter: usize,
    /// `None` leaves function evaluations unbounded.
    pub max_evals: Option<usize>,
    pub xtol: f64,
    pub ftol: f64,
}

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;
const NONZERO_DELTA: f64 = 0.05;
const ZERO_DELTA: f64 = 0.00025;

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iter: 100,
            max_evals: None,
            xtol: 1e-4,
            ftol: 1e-4,
        }
    }
}

impl NelderMead {
    pub fn new(max_iter: usize) -> Self {
        Self {
            max_iter,
            ..Self::default()
        }
    }

    pub fn with_max_evals(mut self, max_evals: usize) -> Self {
        self.max_evals = Some(max_evals);
        self
    }

    pub fn minimize<F>(&self, f: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        if n == 0 {
            return Minimum {
                x: Vec::new(),
                cost: f(x0),
                iterations: 0,
                evaluations: 1,
                termination: Termination::Converged,
            };
        }
        let max_evals = self.max_evals.unwrap_or(usize::MAX);
        let evaluations = Cell::new(0usize);
        let eval = |x: &[f64]| {
            evaluations.set(evaluations.get() + 1);
            f(x)
        };

        let mut sim: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        sim.push(x0.to_vec());
        for k in 0..n {
            let mut y = x0.to_vec();
            y[k] = if y[k] != 0.0 {
                (1.0 + NONZERO_DELTA) * y[k]
            } else {
                ZERO_DELTA
            };
            sim.push(y);
        }
        let mut fsim: Vec<f64> = sim.iter().map(|x| eval(x)).collect();
        sort_simplex(&mut sim, &mut fsim);

        let mut iterations = 1;
        while evaluations.get() < max_evals && iterations < self.max_iter {
            let x_spread = sim[1..]
                .iter()
                .flat_map(|v| v.iter().zip(&sim[0]).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            let f_spread = fsim[1..]
                .iter()
                .map(|v| (fsim[0] - v).abs())
                .fold(0.0, f64::max);
            if x_spread <= self.xtol && f_spread <= self.ftol {
                break;
            }

            let worst = sim[n].clone();
            let xbar: Vec<f64> = (0..n)
                .map(|j| sim[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
                .collect();
            let along = |t: f64| -> Vec<f64> {
                xbar.iter()
                    .zip(&worst)
                    .map(|(b, w)| (1.0 + t) * b - t * w)
                    .collect()
            };

            let xr = along(RHO);
            let fxr = eval(&xr);
            let mut shrink = false;

            if fxr < fsim[0] {
                let xe = along(RHO * CHI);
                let fxe = eval(&xe);
                if fxe < fxr {
                    sim[n] = xe;
                    fsim[n] = fxe;
                } else {
                    sim[n] = xr;
                    fsim[n] = fxr;
                }
            } else if fxr < fsim[n - 1] {
                sim[n] = xr;
                fsim[n] = fxr;
            } else if fxr < fsim[n] {
                // outside contraction
                let xc = along(PSI * RHO);
                let fxc = eval(&xc);
                if fxc <= fxr {
                    sim[n] = xc;
                    fsim[n] = fxc;
                } else {
                    shrink = true;
                }
            } else {
                // inside contraction
                let xcc = along(-PSI);
                let fxcc = eval(&xcc);
                if fxcc < fsim[n] {
                    sim[n] = xcc;
                    fsim[n] = fxcc;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = sim[0].clone();
                for j in 1..=n {
                    sim[j] = best
                        .iter()
                        .zip(&sim[j])
                        .map(|(b, v)| b + SIGMA * (v - b))
                        .collect();
                    fsim[j] = eval(&sim[j]);
                }
            }

            sort_simplex(&mut sim, &mut fsim);
            iterations += 1;
        }

        let evaluations = evaluations.get();
        let termination = if evaluations >= max_evals {
            Termination::MaxEvaluations
        } else if iterations >= self.max_iter {
            Termination::MaxIterations
        } else {
            Termination::Converged
        };
        trace!(
            "Nelder-Mead stopped after {} iterations / {} evaluations: {:?}, cost={:.6}",
            iterations,
            evaluations,
            termination,
            fsim[0]
        );

        Minimum {
            x: sim.swap_remove(0),
            cost: fsim[0],
            iterations,
            evaluations,
            termination,
        }
    }

    /// Minimise the placement cost from a 2-D starting guess.
    pub fn place(&self, guess: Point2, neighbours: &[Point2], p: &[f64]) -> (Point2, f64, Termination) {
        let m = self.minimize(|x| kl_placement_cost(x, neighbours, p), &guess);
        ([m.x[0], m.x[1]], m.cost, m.termination)
    }
}

/// Stable sort of the simplex vertices by cost.
fn sort_simplex(sim: &mut Vec<Vec<f64>>, fsim: &mut Vec<f64>) {
    let mut idx: Vec<usize> = (0..fsim.len()).collect();
    idx.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *sim = idx.iter().map(|&i| sim[i].clone()).collect();
    *fsim = idx.iter().map(|&i| fsim[i]).collect();
}
