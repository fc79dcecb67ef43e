//! Run parameters for training-set construction and re-embedding.
//!
//! `MotionParams` is validated once at every public entry point and is never
//! mutated mid-run. The only sanctioned temporary change is a scoped override
//! (see [`MotionParams::scoped`]) which restores the previous values when the
//! guard is dropped.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// Reference manifold-learning method used for the external fits.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReferenceMethod {
    #[default]
    Tsne,
    Umap,
}

impl FromStr for ReferenceMethod {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tsne" | "t-sne" => Ok(Self::Tsne),
            "umap" => Ok(Self::Umap),
            other => Err(MotionError::Configuration(format!(
                "Supported methods are 'TSNE' or 'UMAP', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ReferenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceMethod::Tsne => write!(f, "TSNE"),
            ReferenceMethod::Umap => write!(f, "UMAP"),
        }
    }
}

/// Gradient approximation requested from a t-SNE reference fit.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TsneQuality {
    #[default]
    Exact,
    BarnesHut,
}

/// What to do with a placement whose optimised position left the
/// triangulated neighbourhood.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutOfHullPolicy {
    /// Overwrite the optimised position with the candidate's initial guess.
    #[default]
    UseGuess,
    /// Keep the optimised position and only flag it.
    KeepOptimized,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MotionParams {
    pub method: ReferenceMethod,
    pub tsne_quality: TsneQuality,
    /// Rows are distributions compared with KL divergence (wavelet amplitudes);
    /// otherwise squared Euclidean distance is used.
    pub probability_features: bool,

    // bandwidth solver
    pub perplexity: f64,
    pub training_perplexity: f64,
    pub max_neighbors: usize,
    pub sigma_tolerance: f64,
    pub max_sigma_iterations: usize,

    // template sampler
    pub min_template_length: usize,
    pub kd_neighbors: usize,
    pub training_set_size: usize,
    pub training_num_points: usize,
    pub density_grid_size: usize,
    pub watershed_connectivity: usize,

    // coordinator
    pub batch_size: usize,
    /// 0 uses every available core.
    pub num_workers: usize,
    pub activity_threshold: f64,
    pub max_optim_iter: usize,
    pub out_of_hull: OutOfHullPolicy,
    pub readout: usize,

    // reference fit post-processing and dataset checks
    pub rescale_max: f64,
    pub bad_divergence_mean: f64,

    pub seed: Option<u64>,
}

impl Default for MotionParams {
    fn default() -> Self {
        debug!("Creating MotionParams with default parameters");
        Self {
            method: ReferenceMethod::Tsne,
            tsne_quality: TsneQuality::Exact,
            probability_features: true,

            perplexity: 32.0,
            training_perplexity: 20.0,
            max_neighbors: 200,
            sigma_tolerance: 1e-5,
            max_sigma_iterations: 200,

            min_template_length: 1,
            kd_neighbors: 5,
            training_set_size: 35_000,
            training_num_points: 20_000,
            density_grid_size: 501,
            watershed_connectivity: 10,

            batch_size: 30_000,
            num_workers: 0,
            activity_threshold: 4e2,
            max_optim_iter: 100,
            out_of_hull: OutOfHullPolicy::UseGuess,
            readout: 100_000,

            rescale_max: 100.0,
            bad_divergence_mean: 1e-5,

            seed: None,
        }
    }
}

// Floats compared with relative tolerance, everything else exactly
impl PartialEq for MotionParams {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.tsne_quality == other.tsne_quality
            && self.probability_features == other.probability_features
            && approx::relative_eq!(self.perplexity, other.perplexity)
            && approx::relative_eq!(self.training_perplexity, other.training_perplexity)
            && self.max_neighbors == other.max_neighbors
            && approx::relative_eq!(self.sigma_tolerance, other.sigma_tolerance)
            && self.max_sigma_iterations == other.max_sigma_iterations
            && self.min_template_length == other.min_template_length
            && self.kd_neighbors == other.kd_neighbors
            && self.training_set_size == other.training_set_size
            && self.training_num_points == other.training_num_points
            && self.density_grid_size == other.density_grid_size
            && self.watershed_connectivity == other.watershed_connectivity
            && self.batch_size == other.batch_size
            && self.num_workers == other.num_workers
            && approx::relative_eq!(self.activity_threshold, other.activity_threshold)
            && self.max_optim_iter == other.max_optim_iter
            && self.out_of_hull == other.out_of_hull
            && self.readout == other.readout
            && approx::relative_eq!(self.rescale_max, other.rescale_max)
            && approx::relative_eq!(self.bad_divergence_mean, other.bad_divergence_mean)
            && self.seed == other.seed
    }
}

impl MotionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: ReferenceMethod) -> Self {
        info!("Setting reference method: {}", method);
        self.method = method;
        self
    }

    pub fn with_tsne_quality(mut self, quality: TsneQuality) -> Self {
        self.tsne_quality = quality;
        self
    }

    pub fn with_probability_features(mut self, probability: bool) -> Self {
        info!("Setting probability features: {}", probability);
        self.probability_features = probability;
        self
    }

    /// Configure the per-query bandwidth solver.
    pub fn with_bandwidth(mut self, perplexity: f64, max_neighbors: usize, tolerance: f64) -> Self {
        info!(
            "Configuring bandwidth solver: perplexity={}, max_neighbors={}, tolerance={:e}",
            perplexity, max_neighbors, tolerance
        );
        self.perplexity = perplexity;
        self.max_neighbors = max_neighbors;
        self.sigma_tolerance = tolerance;
        self
    }

    pub fn with_max_sigma_iterations(mut self, iterations: usize) -> Self {
        self.max_sigma_iterations = iterations;
        self
    }

    pub fn with_training_perplexity(mut self, perplexity: f64) -> Self {
        self.training_perplexity = perplexity;
        self
    }

    /// Configure the template sampler.
    pub fn with_templates(
        mut self,
        min_template_length: usize,
        kd_neighbors: usize,
        training_set_size: usize,
    ) -> Self {
        info!(
            "Configuring templates: min_length={}, kd_neighbors={}, training_set_size={}",
            min_template_length, kd_neighbors, training_set_size
        );
        self.min_template_length = min_template_length;
        self.kd_neighbors = kd_neighbors;
        self.training_set_size = training_set_size;
        self
    }

    pub fn with_training_num_points(mut self, num_points: usize) -> Self {
        self.training_num_points = num_points;
        self
    }

    pub fn with_density_grid(mut self, grid_size: usize, connectivity: usize) -> Self {
        self.density_grid_size = grid_size;
        self.watershed_connectivity = connectivity;
        self
    }

    /// Configure the batch coordinator. `num_workers == 0` uses all cores.
    pub fn with_batching(mut self, batch_size: usize, num_workers: usize) -> Self {
        info!(
            "Configuring batching: batch_size={}, num_workers={}",
            batch_size, num_workers
        );
        self.batch_size = batch_size;
        self.num_workers = num_workers;
        self
    }

    pub fn with_activity_threshold(mut self, threshold: f64) -> Self {
        info!("Setting activity threshold: {}", threshold);
        self.activity_threshold = threshold;
        self
    }

    pub fn with_max_optim_iter(mut self, iterations: usize) -> Self {
        self.max_optim_iter = iterations;
        self
    }

    pub fn with_out_of_hull(mut self, policy: OutOfHullPolicy) -> Self {
        self.out_of_hull = policy;
        self
    }

    pub fn with_readout(mut self, readout: usize) -> Self {
        self.readout = readout;
        self
    }

    pub fn with_rescale_max(mut self, rescale_max: f64) -> Self {
        self.rescale_max = rescale_max;
        self
    }

    pub fn with_bad_divergence_mean(mut self, threshold: f64) -> Self {
        self.bad_divergence_mean = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every field once; called at each public entry point.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(MotionError::Configuration(msg))
        }

        if !(self.perplexity.is_finite() && self.perplexity > 1.0) {
            return bad(format!("perplexity must be > 1, got {}", self.perplexity));
        }
        if !(self.training_perplexity.is_finite() && self.training_perplexity > 1.0) {
            return bad(format!(
                "training_perplexity must be > 1, got {}",
                self.training_perplexity
            ));
        }
        if !(self.sigma_tolerance.is_finite() && self.sigma_tolerance > 0.0) {
            return bad(format!(
                "sigma_tolerance must be positive, got {}",
                self.sigma_tolerance
            ));
        }
        if self.max_neighbors == 0 {
            return bad("max_neighbors must be at least 1".to_string());
        }
        if (self.max_neighbors as f64) < self.perplexity {
            return bad(format!(
                "max_neighbors {} is below perplexity {}",
                self.max_neighbors, self.perplexity
            ));
        }
        if self.max_sigma_iterations == 0 || self.max_optim_iter == 0 {
            return bad("iteration bounds must be at least 1".to_string());
        }
        if self.kd_neighbors == 0 {
            return bad("kd_neighbors must be at least 1".to_string());
        }
        if self.training_set_size == 0 || self.training_num_points == 0 {
            return bad("training_set_size and training_num_points must be positive".to_string());
        }
        if self.density_grid_size < 3 {
            return bad(format!(
                "density_grid_size must be at least 3, got {}",
                self.density_grid_size
            ));
        }
        if self.batch_size == 0 {
            return bad("batch_size must be at least 1".to_string());
        }
        if !(self.activity_threshold.is_finite() && self.activity_threshold >= 0.0) {
            return bad(format!(
                "activity_threshold must be finite and non-negative, got {}",
                self.activity_threshold
            ));
        }
        if !(self.rescale_max.is_finite() && self.rescale_max > 0.0) {
            return bad(format!("rescale_max must be positive, got {}", self.rescale_max));
        }
        if self.method == ReferenceMethod::Umap && !self.probability_features {
            return bad("UMAP reference fits require probability (wavelet) features".to_string());
        }
        Ok(())
    }

    /// Temporarily override fields; the previous values come back when the
    /// returned guard is dropped, whatever the exit path.
    pub fn scoped<F>(&mut self, apply: F) -> ScopedParams<'_>
    where
        F: FnOnce(&mut MotionParams),
    {
        let saved = self.clone();
        apply(self);
        debug!(
            "Scoped parameter override active (tsne_quality={:?}, perplexity={})",
            self.tsne_quality, self.perplexity
        );
        ScopedParams {
            params: self,
            saved: Some(saved),
        }
    }
}

/// Guard returned by [`MotionParams::scoped`].
pub struct ScopedParams<'a> {
    params: &'a mut MotionParams,
    saved: Option<MotionParams>,
}

impl Deref for ScopedParams<'_> {
    type Target = MotionParams;

    fn deref(&self) -> &MotionParams {
        self.params
    }
}

impl Drop for ScopedParams<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.params = saved;
            debug!("Scoped parameter override restored");
        }
    }
}
