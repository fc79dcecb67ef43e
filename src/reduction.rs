//! Built-in reference fit: seeded Gaussian random projection to 2-D.
//!
//! Real runs plug a t-SNE or UMAP implementation in through
//! [`ReferenceFit`](crate::training::ReferenceFit). This fit is deterministic
//! for a given seed and is what tests and benches use. Its output gets the
//! same post-processing as a UMAP fit: centred on the mean and scaled so the
//! largest absolute raw coordinate maps to `rescale_max`. The
//! [`FitTransform`] holding that mean and scale is serialisable so it can be
//! re-applied to later projections.

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::{
    arrays::{Array, Array2},
    matrix::DenseMatrix,
};

use crate::config::{MotionParams, ReferenceMethod};
use crate::core::{feature_width, Point2};
use crate::error::{MotionError, Result};
use crate::training::ReferenceFit;

/// Gaussian projection whose matrix is regenerated from the seed on demand.
#[derive(Clone, Debug)]
pub struct ImplicitProjection {
    pub(crate) original_dim: usize,
    pub(crate) reduced_dim: usize,
    pub(crate) seed: u64,
}

impl ImplicitProjection {
    pub fn new(original_dim: usize, reduced_dim: usize) -> Self {
        Self::with_seed(original_dim, reduced_dim, rand::random())
    }

    pub fn with_seed(original_dim: usize, reduced_dim: usize, seed: u64) -> Self {
        Self {
            original_dim,
            reduced_dim,
            seed,
        }
    }

    pub fn project(&self, query: &[f64]) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let scale = 1.0 / (self.reduced_dim as f64).sqrt();

        let mut result = vec![0.0; self.reduced_dim];
        for &q in query.iter().take(self.original_dim) {
            for r in result.iter_mut() {
                let sample: f64 = StandardNormal.sample(&mut rng);
                *r += q * sample * scale;
            }
        }
        result
    }
}

/// Project every row of `data`.
pub fn project_matrix(data: &DenseMatrix<f64>, projection: &ImplicitProjection) -> DenseMatrix<f64> {
    debug!("Computing project matrix for projection {:?}", projection);
    let (n_rows, _n_cols) = data.shape();
    let target_dim = projection.reduced_dim;

    let flat: Vec<f64> = (0..n_rows)
        .into_par_iter()
        .flat_map_iter(|i| {
            let row: Vec<f64> = data.get_row(i).iterator(0).copied().collect();
            projection.project(&row)
        })
        .collect();

    DenseMatrix::from_iterator(flat.into_iter(), n_rows, target_dim, 0)
}

/// Centring and scaling applied to a raw 2-D fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitTransform {
    pub mean: Point2,
    pub scale: f64,
}

impl FitTransform {
    /// Mean of `raw`, and `rescale_max / max |raw|`.
    pub fn fit(raw: &[Point2], rescale_max: f64) -> Result<Self> {
        if raw.is_empty() {
            return Err(MotionError::EmptyInput("raw reference fit".to_string()));
        }
        let n = raw.len() as f64;
        let mean = raw
            .iter()
            .fold([0.0, 0.0], |acc, p| [acc[0] + p[0] / n, acc[1] + p[1] / n]);
        let max_abs = raw
            .iter()
            .flat_map(|p| p.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        if !(max_abs.is_finite() && max_abs > 0.0) {
            return Err(MotionError::ReferenceFit(format!(
                "cannot rescale a fit with max |y| = {}",
                max_abs
            )));
        }
        Ok(Self {
            mean,
            scale: rescale_max / max_abs,
        })
    }

    pub fn apply(&self, p: Point2) -> Point2 {
        [
            (p[0] - self.mean[0]) * self.scale,
            (p[1] - self.mean[1]) * self.scale,
        ]
    }
}

/// Deterministic 2-D reference fit, standing in for `method`.
#[derive(Clone, Debug)]
pub struct ProjectionFit {
    seed: u64,
    method: ReferenceMethod,
}

impl ProjectionFit {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            method: ReferenceMethod::default(),
        }
    }

    pub fn with_method(mut self, method: ReferenceMethod) -> Self {
        self.method = method;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fit and keep the transform for re-use on new projections.
    pub fn fit_with_transform(
        &self,
        rows: &[Vec<f64>],
        params: &MotionParams,
    ) -> Result<(Vec<Point2>, FitTransform)> {
        let n = rows.len();
        let d = feature_width(rows)?;
        if d == 0 {
            return Err(MotionError::EmptyInput("reference fit of zero-width rows".to_string()));
        }
        let projection = ImplicitProjection::with_seed(d, 2, self.seed);
        let data = DenseMatrix::from_iterator(rows.iter().flatten().copied(), n, d, 0);
        let projected = project_matrix(&data, &projection);
        let raw: Vec<Point2> = (0..n)
            .map(|i| [*projected.get((i, 0)), *projected.get((i, 1))])
            .collect();
        let transform = FitTransform::fit(&raw, params.rescale_max)?;
        debug!(
            "Projection fit of {} rows: mean={:?}, scale={:.4}",
            rows.len(),
            transform.mean,
            transform.scale
        );
        Ok((raw.into_iter().map(|p| transform.apply(p)).collect(), transform))
    }
}

impl ReferenceFit for ProjectionFit {
    fn method(&self) -> ReferenceMethod {
        self.method
    }

    fn fit(&self, rows: &[Vec<f64>], params: &MotionParams) -> Result<Vec<Point2>> {
        self.fit_with_transform(rows, params).map(|(y, _)| y)
    }
}
