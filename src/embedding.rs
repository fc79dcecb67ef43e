//! Batch re-embedding of new feature rows against a fixed training set.
//!
//! Queries are split into sequential batches. Within a batch the M-wide
//! divergence rows are computed up front, then every query is placed by an
//! independent task on a dedicated rayon pool. Results are collected by
//! index, so output order always matches input order.
//!
//! The first failing task aborts the batch: `collect::<Result<Vec<_>>>` stops
//! handing out work and joins everything in flight before the error is
//! returned. Nothing from a failed run is returned.
//!
//! # Examples
//!
//! ```
//! use motionspace::config::MotionParams;
//! use motionspace::core::{normalise_rows, TrainingSet};
//! use motionspace::embedding::BatchEmbedder;
//!
//! let raw: Vec<Vec<f64>> = (0..40)
//!     .map(|i| vec![1.0 + (i % 5) as f64, 2.0 + (i % 7) as f64, 3.0 + (i % 3) as f64])
//!     .collect();
//! let coords: Vec<[f64; 2]> = (0..40)
//!     .map(|i| [(i % 5) as f64 + 0.01 * i as f64, (i % 7) as f64 - 0.02 * i as f64])
//!     .collect();
//! let training = TrainingSet::new(normalise_rows(&raw).unwrap(), coords).unwrap();
//!
//! let params = MotionParams::default()
//!     .with_bandwidth(5.0, 30, 1e-5)
//!     .with_activity_threshold(0.0)
//!     .with_batching(16, 2);
//! let embedder = BatchEmbedder::new(training.into_shared(), params).unwrap();
//! let out = embedder.embed(&raw[..4]).unwrap();
//! assert_eq!(out.z.len(), 4);
//! ```

use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::{MotionParams, OutOfHullPolicy};
use crate::core::{feature_width, normalise_row, Point2, TrainingSet, UNEMBEDDED};
use crate::divergence::{floor_zeros, list_kl_divergences, sq_euclidean_distances};
use crate::error::{MotionError, Result};
use crate::optimizer::Termination;
use crate::selector::{CandidateKind, CandidateSelector, Placement};

/// Per-point statistics of an embedding run, index-aligned with the input.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EmbeddingDiagnostics {
    /// Achieved cost; NaN for unembedded points.
    pub costs: Vec<f64>,
    /// Initial guess of the chosen candidate; NaN pair for unembedded points.
    pub guesses: Vec<Point2>,
    pub in_hull: Vec<bool>,
    pub chosen: Vec<Option<CandidateKind>>,
    pub termination: Vec<Option<Termination>>,
    pub embedded: Vec<bool>,
    /// The out-of-hull policy overwrote the optimised position.
    pub replaced_by_guess: Vec<bool>,
    /// The neighbourhood could not be triangulated.
    pub degenerate: Vec<bool>,
}

impl EmbeddingDiagnostics {
    fn with_len(n: usize) -> Self {
        Self {
            costs: vec![f64::NAN; n],
            guesses: vec![UNEMBEDDED; n],
            in_hull: vec![false; n],
            chosen: vec![None; n],
            termination: vec![None; n],
            embedded: vec![false; n],
            replaced_by_guess: vec![false; n],
            degenerate: vec![false; n],
        }
    }

    fn record(&mut self, i: usize, placement: &Placement, replaced: bool) {
        self.costs[i] = placement.cost;
        self.guesses[i] = placement.guess;
        self.in_hull[i] = placement.in_hull;
        self.chosen[i] = Some(placement.chosen);
        self.termination[i] = Some(placement.termination);
        self.embedded[i] = true;
        self.replaced_by_guess[i] = replaced;
        self.degenerate[i] = placement.degenerate;
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn n_embedded(&self) -> usize {
        self.embedded.iter().filter(|&&e| e).count()
    }

    pub fn n_unembedded(&self) -> usize {
        self.len() - self.n_embedded()
    }

    pub fn n_out_of_hull(&self) -> usize {
        self.embedded
            .iter()
            .zip(&self.in_hull)
            .filter(|&(&e, &h)| e && !h)
            .count()
    }

    pub fn n_replaced(&self) -> usize {
        self.replaced_by_guess.iter().filter(|&&r| r).count()
    }

    pub fn n_degenerate(&self) -> usize {
        self.degenerate.iter().filter(|&&d| d).count()
    }
}

/// Final coordinates plus diagnostics. Unembedded rows hold [`UNEMBEDDED`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Embedding {
    pub z: Vec<Point2>,
    pub diagnostics: EmbeddingDiagnostics,
}

/// Owns the shared training set and a fixed worker pool.
pub struct BatchEmbedder {
    training: Arc<TrainingSet>,
    params: MotionParams,
    pool: rayon::ThreadPool,
}

impl BatchEmbedder {
    pub fn new(training: Arc<TrainingSet>, params: MotionParams) -> Result<Self> {
        params.validate()?;
        if training.is_empty() {
            return Err(MotionError::EmptyInput("training set".to_string()));
        }
        let reachable = params.max_neighbors.min(training.len());
        if (reachable as f64) < params.perplexity {
            return Err(MotionError::Configuration(format!(
                "perplexity {} cannot be reached with {} neighbours ({} training points, max_neighbors {})",
                params.perplexity,
                reachable,
                training.len(),
                params.max_neighbors
            )));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.num_workers)
            .thread_name(|i| format!("motionspace-embed-{}", i))
            .build()?;
        info!(
            "BatchEmbedder ready: {} training points, {} features, {} workers",
            training.len(),
            training.nfeatures(),
            pool.current_num_threads()
        );
        Ok(Self {
            training,
            params,
            pool,
        })
    }

    pub fn training(&self) -> &TrainingSet {
        &self.training
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// Embed raw (un-normalised) feature rows.
    ///
    /// Rows whose total amplitude does not exceed `activity_threshold` are
    /// left unembedded. The rest are normalised before placement.
    pub fn embed(&self, raw: &[Vec<f64>]) -> Result<Embedding> {
        let n = raw.len();
        let mut z = vec![UNEMBEDDED; n];
        let mut diagnostics = EmbeddingDiagnostics::with_len(n);
        if n == 0 {
            return Ok(Embedding { z, diagnostics });
        }

        let width = feature_width(raw)?;
        if width != self.training.nfeatures() {
            return Err(MotionError::DimensionMismatch {
                expected: self.training.nfeatures(),
                got: width,
            });
        }

        let mut active: Vec<usize> = Vec::with_capacity(n);
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);
        for (i, row) in raw.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            if sum > self.params.activity_threshold {
                let mut normed = normalise_row(row)?;
                if self.params.probability_features {
                    floor_zeros(&mut normed);
                }
                active.push(i);
                rows.push(normed);
            }
        }
        info!(
            "Embedding {} of {} points ({} below activity threshold {})",
            active.len(),
            n,
            n - active.len(),
            self.params.activity_threshold
        );

        let selector = CandidateSelector::from_params(&self.training, &self.params);
        let batch_size = self.params.batch_size;
        let n_batches = rows.len().div_ceil(batch_size);

        for (b, chunk) in rows.chunks(batch_size).enumerate() {
            let offset = b * batch_size;
            info!(
                "Processing batch {} of {} ({} points)",
                b + 1,
                n_batches,
                chunk.len()
            );
            let distances = self.distance_rows(chunk);
            let indices = &active[offset..offset + chunk.len()];
            let placements = self.place_batch(&selector, &distances, indices)?;

            for (&i, placement) in indices.iter().zip(&placements) {
                let replaced = !placement.in_hull
                    && !placement.degenerate
                    && self.params.out_of_hull == OutOfHullPolicy::UseGuess;
                z[i] = if replaced {
                    placement.guess
                } else {
                    placement.position
                };
                diagnostics.record(i, placement, replaced);
            }
        }

        info!(
            "Embedded {} points: {} unembedded, {} out of hull ({} replaced by guess), {} degenerate neighbourhoods",
            diagnostics.n_embedded(),
            diagnostics.n_unembedded(),
            diagnostics.n_out_of_hull(),
            diagnostics.n_replaced(),
            diagnostics.n_degenerate()
        );
        if diagnostics.n_degenerate() > 0 {
            warn!(
                "{} points had too few neighbours to triangulate and kept their initial guess",
                diagnostics.n_degenerate()
            );
        }

        Ok(Embedding { z, diagnostics })
    }

    fn distance_rows(&self, chunk: &[Vec<f64>]) -> DenseMatrix<f64> {
        if self.params.probability_features {
            list_kl_divergences(chunk, self.training.data())
        } else {
            sq_euclidean_distances(chunk, self.training.data())
        }
    }

    /// Place every row of `distances` on the pool, in order, failing fast.
    /// `indices` are the rows' positions in the caller's input.
    fn place_batch(
        &self,
        selector: &CandidateSelector<'_>,
        distances: &DenseMatrix<f64>,
        indices: &[usize],
    ) -> Result<Vec<Placement>> {
        let (nrows, _) = distances.shape();
        let readout = self.params.readout;
        let placements = self.pool.install(|| {
            (0..nrows)
                .into_par_iter()
                .map(|k| {
                    let row: Vec<f64> = distances.get_row(k).iterator(0).copied().collect();
                    let placed = selector
                        .place(&row)
                        .map_err(|e| MotionError::in_task(indices[k], e));
                    if reports_progress(indices[k], readout) {
                        info!("Calculating point {}", indices[k]);
                    }
                    placed
                })
                .collect::<Result<Vec<Placement>>>()
        });
        match &placements {
            Err(e) => warn!("Batch aborted: {}", e),
            Ok(p) => debug!("Batch placed {} points", p.len()),
        }
        placements
    }
}

/// Whether point `index` (0-based) gets a progress line: every `readout`-th point.
pub(crate) fn reports_progress(index: usize, readout: usize) -> bool {
    (index + 1) % readout.max(1) == 0
}

/// Build a one-off embedder and embed `raw` against `training`.
pub fn find_embeddings(
    raw: &[Vec<f64>],
    training: Arc<TrainingSet>,
    params: &MotionParams,
) -> Result<Embedding> {
    BatchEmbedder::new(training, params.clone())?.embed(raw)
}
