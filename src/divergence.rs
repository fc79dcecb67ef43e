//! Divergences and distances between feature rows.
//!
//! Probability rows (normalised wavelet amplitudes) are compared with the
//! Kullback-Leibler divergence in bits; other features use squared Euclidean
//! distance. Wide results are returned as row-major `DenseMatrix`.

use log::{debug, trace};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;

/// Value substituted for zeros before taking logarithms.
pub const LOG_FLOOR: f64 = 1e-12;

/// Shannon entropy in nats, with `0·log 0 = 0`.
pub fn entropy(row: &[f64]) -> f64 {
    -row.iter()
        .filter(|&&x| x > 0.0)
        .map(|&x| x * x.ln())
        .sum::<f64>()
}

/// Replace exact zeros with [`LOG_FLOOR`] in place. Returns how many were replaced.
pub fn floor_zeros(row: &mut [f64]) -> usize {
    let mut n = 0;
    for v in row.iter_mut() {
        if *v == 0.0 {
            *v = LOG_FLOOR;
            n += 1;
        }
    }
    n
}

fn floored_logs(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    rows.par_iter()
        .map(|r| r.iter().map(|&x| x.max(LOG_FLOOR).ln()).collect())
        .collect()
}

#[inline]
fn kl_bits(q: &[f64], q_entropy: f64, log_r: &[f64]) -> f64 {
    let cross: f64 = q.iter().zip(log_r).map(|(a, b)| a * b).sum();
    (-cross - q_entropy) / std::f64::consts::LN_2
}

/// KL divergence (bits) from every query row to every reference row.
///
/// `D[i, j] = Σ_k q_ik (ln q_ik − ln r_jk) / ln 2`. Reference entries are floored
/// at [`LOG_FLOOR`] before the logarithm.
pub fn list_kl_divergences(queries: &[Vec<f64>], reference: &[Vec<f64>]) -> DenseMatrix<f64> {
    let (n, m) = (queries.len(), reference.len());
    debug!("Computing {}x{} KL divergences", n, m);
    let log_ref = floored_logs(reference);

    let flat: Vec<f64> = queries
        .par_iter()
        .flat_map_iter(|q| {
            let h = entropy(q);
            log_ref
                .iter()
                .map(move |lr| kl_bits(q, h, lr))
                .collect::<Vec<f64>>()
        })
        .collect();

    DenseMatrix::from_iterator(flat.into_iter(), n, m, 0)
}

/// All-pairs KL divergence (bits) with a zero diagonal, plus row entropies (nats).
///
/// Logarithms of zero entries contribute 0, so rows with disjoint support
/// stay finite.
pub fn pairwise_kl_divergences(rows: &[Vec<f64>]) -> (DenseMatrix<f64>, Vec<f64>) {
    let n = rows.len();
    debug!("Computing {}x{} pairwise KL divergences", n, n);
    let logs: Vec<Vec<f64>> = rows
        .par_iter()
        .map(|r| {
            r.iter()
                .map(|&x| if x > 0.0 { x.ln() } else { 0.0 })
                .collect()
        })
        .collect();
    let entropies: Vec<f64> = rows.iter().map(|r| entropy(r)).collect();

    let flat: Vec<f64> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let (q, h, logs) = (&rows[i], entropies[i], &logs);
            (0..n)
                .map(move |j| if i == j { 0.0 } else { kl_bits(q, h, &logs[j]) })
                .collect::<Vec<f64>>()
        })
        .collect();

    (DenseMatrix::from_iterator(flat.into_iter(), n, n, 0), entropies)
}

#[inline]
pub fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

pub fn euclidean_dist(a: &[f64], b: &[f64]) -> f64 {
    sq_euclidean(a, b).sqrt()
}

/// Squared Euclidean distance from every query row to every reference row.
pub fn sq_euclidean_distances(queries: &[Vec<f64>], reference: &[Vec<f64>]) -> DenseMatrix<f64> {
    let (n, m) = (queries.len(), reference.len());
    debug!("Computing {}x{} squared Euclidean distances", n, m);
    let flat: Vec<f64> = queries
        .par_iter()
        .flat_map_iter(|q| {
            reference
                .iter()
                .map(move |r| sq_euclidean(q, r))
                .collect::<Vec<f64>>()
        })
        .collect();
    DenseMatrix::from_iterator(flat.into_iter(), n, m, 0)
}

/// Mean of the squared all-pairs divergence matrix, streamed without storing it.
///
/// Probability rows use the same KL convention as [`pairwise_kl_divergences`];
/// otherwise squared Euclidean distance is used. Non-finite entries count as 0.
/// A near-zero mean flags a dataset whose rows are indistinguishable.
pub fn mean_squared_divergence(rows: &[Vec<f64>], probability: bool) -> f64 {
    let n = rows.len();
    if n == 0 {
        return 0.0;
    }
    let logs: Vec<Vec<f64>> = if probability {
        rows.par_iter()
            .map(|r| {
                r.iter()
                    .map(|&x| if x > 0.0 { x.ln() } else { 0.0 })
                    .collect()
            })
            .collect()
    } else {
        Vec::new()
    };

    let total: f64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let q = &rows[i];
            let h = if probability { entropy(q) } else { 0.0 };
            let mut acc = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = if probability {
                    kl_bits(q, h, &logs[j])
                } else {
                    sq_euclidean(q, &rows[j])
                };
                if d.is_finite() {
                    acc += d * d;
                }
            }
            acc
        })
        .sum();

    let mean = total / (n * n) as f64;
    trace!("Mean squared divergence over {} rows: {:.6e}", n, mean);
    mean
}
