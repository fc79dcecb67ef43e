//! Smoothed 2-D density of a reference embedding.
//!
//! Points are binned onto a square grid spanning `[-maxY, maxY]` on both axes
//! (`maxY = ceil(max |y|) + 1`), the histogram is normalised to unit mass and
//! then convolved with a separable Gaussian whose width is the median k-th
//! nearest-neighbour distance of the embedding. The grid is stored with rows
//! along y and columns along x.

use log::{debug, trace};
use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::core::Point2;
use crate::divergence::euclidean_dist;
use crate::error::{MotionError, Result};

/// Gaussian kernels are truncated at this many standard deviations.
const KERNEL_RADIUS_SIGMAS: f64 = 4.0;

/// Median distance from each point to its `k`-th nearest other point.
///
/// `k` is clamped to `n - 1`; at least two points are required.
pub fn knn_bandwidth(coords: &[Point2], k: usize) -> Result<f64> {
    let n = coords.len();
    if n < 2 {
        return Err(MotionError::EmptyInput(format!(
            "k-NN bandwidth needs at least 2 points, got {}",
            n
        )));
    }
    let k = k.clamp(1, n - 1);

    let mut kth: Vec<f64> = coords
        .par_iter()
        .enumerate()
        .map(|(i, a)| {
            let mut d: Vec<f64> = coords
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, b)| euclidean_dist(a, b))
                .collect();
            d.select_nth_unstable_by(k - 1, |x, y| x.total_cmp(y));
            d[k - 1]
        })
        .collect();

    kth.sort_by(|a, b| a.total_cmp(b));
    let median = if n % 2 == 1 {
        kth[n / 2]
    } else {
        0.5 * (kth[n / 2 - 1] + kth[n / 2])
    };
    debug!("k-NN bandwidth (k={}, n={}): {:.6}", k, n, median);
    Ok(median)
}

fn gaussian_kernel(sigma_cells: f64, max_radius: usize) -> Vec<f64> {
    let radius = ((KERNEL_RADIUS_SIGMAS * sigma_cells).ceil() as usize).min(max_radius);
    let norm = 1.0 / ((2.0 * std::f64::consts::PI).sqrt() * sigma_cells);
    (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            norm * (-0.5 * (x / sigma_cells).powi(2)).exp()
        })
        .collect()
}

/// 1-D convolution of every row of a row-major `nrows × ncols` buffer,
/// zero-padded at the borders.
fn convolve_rows(data: &[f64], nrows: usize, ncols: usize, kernel: &[f64]) -> Vec<f64> {
    let radius = kernel.len() / 2;
    let mut out = vec![0.0; nrows * ncols];
    out.par_chunks_mut(ncols)
        .zip(data.par_chunks(ncols))
        .for_each(|(dst, src)| {
            for (c, slot) in dst.iter_mut().enumerate() {
                let lo = c.saturating_sub(radius);
                let hi = (c + radius).min(ncols - 1);
                *slot = (lo..=hi)
                    .map(|s| src[s] * kernel[s + radius - c])
                    .sum();
            }
        });
    out
}

fn transpose(data: &[f64], nrows: usize, ncols: usize) -> Vec<f64> {
    let mut out = vec![0.0; nrows * ncols];
    for r in 0..nrows {
        for c in 0..ncols {
            out[c * nrows + r] = data[r * ncols + c];
        }
    }
    out
}

/// Density grid over a reference embedding.
#[derive(Clone, Debug)]
pub struct DensityField {
    grid: DenseMatrix<f64>,
    /// Bin centres shared by both axes (`linspace(-maxY, maxY, size)`).
    axis: Vec<f64>,
    sigma: f64,
}

impl DensityField {
    /// Rasterise `coords` on a `grid_size × grid_size` grid smoothed by `sigma`.
    pub fn estimate(coords: &[Point2], sigma: f64, grid_size: usize) -> Result<Self> {
        if coords.is_empty() {
            return Err(MotionError::EmptyInput("density of an empty embedding".to_string()));
        }
        if grid_size < 3 {
            return Err(MotionError::Configuration(format!(
                "density grid needs at least 3 bins, got {}",
                grid_size
            )));
        }
        if coords.iter().any(|p| !(p[0].is_finite() && p[1].is_finite())) {
            return Err(MotionError::NumericDegeneracy(
                "non-finite reference coordinate".to_string(),
            ));
        }

        let max_abs = coords
            .iter()
            .flat_map(|p| p.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let max_y = max_abs.ceil() + 1.0;
        let step = 2.0 * max_y / (grid_size - 1) as f64;
        let axis: Vec<f64> = (0..grid_size).map(|i| -max_y + i as f64 * step).collect();

        // nearest-centre histogram, rows along y
        let mut hist = vec![0.0; grid_size * grid_size];
        for p in coords {
            let col = nearest_bin(p[0], max_y, step, grid_size);
            let row = nearest_bin(p[1], max_y, step, grid_size);
            hist[row * grid_size + col] += 1.0;
        }
        let mass = coords.len() as f64;
        hist.iter_mut().for_each(|h| *h /= mass);

        let sigma = if sigma.is_finite() && sigma > 0.0 {
            sigma
        } else {
            debug!("Degenerate density bandwidth {}, using one grid step", sigma);
            step
        };
        let kernel = gaussian_kernel(sigma / step, grid_size - 1);
        trace!(
            "Density kernel: sigma={:.4}, step={:.4}, taps={}",
            sigma,
            step,
            kernel.len()
        );

        let along_x = convolve_rows(&hist, grid_size, grid_size, &kernel);
        let along_y = convolve_rows(&transpose(&along_x, grid_size, grid_size), grid_size, grid_size, &kernel);
        let smoothed = transpose(&along_y, grid_size, grid_size);

        let grid = DenseMatrix::from_iterator(
            smoothed.into_iter().map(|v| v.max(0.0)),
            grid_size,
            grid_size,
            0,
        );
        debug!(
            "Density field: {}x{} grid over [-{}, {}], sigma={:.4}",
            grid_size, grid_size, max_y, max_y, sigma
        );

        Ok(Self { grid, axis, sigma })
    }

    pub fn grid(&self) -> &DenseMatrix<f64> {
        &self.grid
    }

    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn size(&self) -> usize {
        self.axis.len()
    }

    /// Density at grid cell (`row` = y bin, `col` = x bin).
    pub fn at(&self, row: usize, col: usize) -> f64 {
        *self.grid.get((row, col))
    }

    /// Row-major copy of the grid.
    pub fn to_flat(&self) -> Vec<f64> {
        let n = self.size();
        (0..n)
            .flat_map(|r| self.grid.get_row(r).iterator(0).copied().collect::<Vec<f64>>())
            .collect()
    }

    /// Grid cell `(row, col)` of a point: index of the first axis value
    /// greater than the coordinate, clamped to the grid.
    pub fn cell_of(&self, p: Point2) -> (usize, usize) {
        let last = self.axis.len() - 1;
        let bin = |v: f64| self.axis.partition_point(|&e| e <= v).min(last);
        (bin(p[1]), bin(p[0]))
    }
}

fn nearest_bin(v: f64, max_y: f64, step: f64, size: usize) -> usize {
    let idx = ((v + max_y) / step).round();
    (idx.max(0.0) as usize).min(size - 1)
}
