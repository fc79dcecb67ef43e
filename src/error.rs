//! Error types for motionspace.
//!
//! Fatal conditions surface as a [`MotionError`]. Recoverable ones (bad
//! datasets, degenerate neighbourhoods) are never raised: they are recorded in
//! the diagnostics returned next to the primary results.

use thiserror::Error;

/// Motionspace error types.
#[derive(Error, Debug)]
pub enum MotionError {
    /// Unsupported or inconsistent parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Per-dataset training quota larger than the per-dataset point budget
    #[error(
        "Training set needs {required} samples per dataset but only {budget} points are \
         subsampled per dataset; decrease training_set_size or increase training_num_points"
    )]
    QuotaExceedsBudget { required: usize, budget: usize },

    /// Non-finite or degenerate numeric state
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Bandwidth bisection ran out of iterations
    #[error(
        "Bandwidth search did not converge after {iterations} iterations \
         (perplexity {perplexity:.6}, target {target:.6})"
    )]
    Convergence {
        iterations: usize,
        perplexity: f64,
        target: f64,
    },

    /// Too few or collinear neighbours to triangulate
    #[error("Insufficient neighbourhood: {0}")]
    InsufficientNeighborhood(String),

    /// Invalid vector dimensions
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Empty input where non-empty was required
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A per-point worker task failed; the enclosing batch is aborted
    #[error("Embedding task for point {index} failed: {source}")]
    TaskFailed {
        index: usize,
        #[source]
        source: Box<MotionError>,
    },

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The external reference fit returned unusable output
    #[error("Reference fit error: {0}")]
    ReferenceFit(String),
}

impl MotionError {
    /// Wrap an error raised while placing point `index`.
    pub fn in_task(index: usize, source: MotionError) -> Self {
        MotionError::TaskFailed {
            index,
            source: Box::new(source),
        }
    }
}

/// Result type alias for motionspace operations.
pub type Result<T> = std::result::Result<T, MotionError>;
