//! # motionspace: stable 2-D behavioural maps
//!
//! motionspace keeps a fixed 2-D reference embedding of high-dimensional
//! feature rows (typically normalised wavelet amplitudes) and places new rows
//! into it without re-running the manifold-learning fit.
//!
//! Two pipelines:
//!
//! - **Training-set construction** ([`training`]): subsample every dataset,
//!   embed the subsample with a mini reference fit, segment its density into
//!   watershed basins ([`density`], [`watershed`], [`templates`]) and draw a
//!   bounded training set proportionally from those basins ([`sampling`]).
//! - **Re-embedding** ([`embedding`]): for each new row, solve a per-point
//!   kernel bandwidth ([`bandwidth`]), triangulate its training neighbours
//!   ([`geometry`]), minimise a KL placement cost from two starting guesses
//!   ([`optimizer`]) and keep the best candidate that stayed in the
//!   neighbourhood ([`selector`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use motionspace::{find_embeddings, fit_reference, build_training_set};
//! use motionspace::{InMemoryFeatures, MotionParams, ProjectionFit};
//!
//! let rows = |offset: usize| -> Vec<Vec<f64>> {
//!     (0..120)
//!         .map(|i| {
//!             let k = (i + offset) as f64;
//!             vec![10.0 + (k * 0.37).sin() * 5.0, 10.0 + (k * 0.11).cos() * 5.0, 5.0 + (k % 7.0), 3.0]
//!         })
//!         .collect()
//! };
//! let provider = InMemoryFeatures::new()
//!     .with_dataset("fly-1", rows(0))
//!     .with_dataset("fly-2", rows(500));
//!
//! let params = MotionParams::default()
//!     .with_activity_threshold(0.0)
//!     .with_templates(1, 5, 80)
//!     .with_training_num_points(100)
//!     .with_density_grid(65, 10)
//!     .with_bandwidth(8.0, 60, 1e-5)
//!     .with_seed(7);
//!
//! let fit = ProjectionFit::new(42);
//! let samples = build_training_set(&provider, &fit, &params)?;
//! let training = fit_reference(&samples, &fit, &params)?;
//!
//! let embedded = find_embeddings(&rows(1000)[..10], training.into_shared(), &params)?;
//! assert_eq!(embedded.z.len(), 10);
//! # Ok::<(), motionspace::MotionError>(())
//! ```

pub mod bandwidth;
pub mod config;
pub mod core;
pub mod density;
pub mod diagnostics;
pub mod divergence;
pub mod embedding;
pub mod error;
pub mod geometry;
pub mod optimizer;
pub mod reduction;
pub mod sampling;
pub mod selector;
pub mod templates;
pub mod training;
pub mod watershed;

// Re-exports for convenience
pub use bandwidth::{Bandwidth, BandwidthSolver};
pub use config::{MotionParams, OutOfHullPolicy, ReferenceMethod, TsneQuality};
pub use crate::core::{normalise_rows, Point2, TrainingSet, UNEMBEDDED};
pub use diagnostics::RunDiagnostics;
pub use embedding::{find_embeddings, BatchEmbedder, Embedding, EmbeddingDiagnostics};
pub use error::{MotionError, Result};
pub use geometry::Neighbourhood;
pub use optimizer::{NelderMead, Termination};
pub use reduction::{FitTransform, ProjectionFit};
pub use sampling::{ProportionalSampler, TemplateSampler};
pub use selector::{CandidateKind, CandidateSelector, Placement};
pub use templates::{find_templates, Template, TemplateSet};
pub use training::{
    build_training_set, fit_reference, FeatureProvider, InMemoryFeatures, ReferenceFit,
    TrainingSamples, TrainingSetBuilder,
};

#[cfg(test)]
mod tests;
