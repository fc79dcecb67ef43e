//! Feature rows and the immutable training set.
//!
//! This module provides the two data abstractions every other stage works on:
//!
//! - Feature rows: row-major `Vec<Vec<f64>>` of non-negative amplitudes. Rows
//!   are turned into discrete distributions with [`normalise_rows`] before any
//!   divergence is computed; a zero-sum row is rejected, never divided.
//! - [`TrainingSet`]: M normalised feature rows paired with their M reference
//!   embedding coordinates. Built once, then shared read-only (`Arc`) by every
//!   embedding worker for the rest of the run.
//!
//! # Examples
//!
//! ```
//! use motionspace::core::{normalise_rows, TrainingSet};
//!
//! let rows = normalise_rows(&[vec![1.0, 3.0], vec![2.0, 2.0], vec![4.0, 0.0]]).unwrap();
//! let training = TrainingSet::new(rows, vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]).unwrap();
//! assert_eq!(training.len(), 3);
//! assert_eq!(training.nfeatures(), 2);
//! ```

use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// A 2-D coordinate in the reference embedding.
pub type Point2 = [f64; 2];

/// Sentinel coordinate for points excluded from embedding.
pub const UNEMBEDDED: Point2 = [f64::NAN, f64::NAN];

/// Tolerance used when checking that a row is a distribution.
pub const NORMALISATION_TOL: f64 = 1e-9;

/// Sum of every row (the row's total amplitude).
pub fn row_sums(rows: &[Vec<f64>]) -> Vec<f64> {
    rows.iter().map(|r| r.iter().sum()).collect()
}

/// Normalise one row to sum 1.
///
/// Fails with `NumericDegeneracy` on a zero, negative or non-finite sum.
pub fn normalise_row(row: &[f64]) -> Result<Vec<f64>> {
    let sum: f64 = row.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(MotionError::NumericDegeneracy(format!(
            "cannot normalise row with sum {}",
            sum
        )));
    }
    Ok(row.iter().map(|x| x / sum).collect())
}

/// Normalise every row to sum 1. The first invalid row aborts with its index.
pub fn normalise_rows(rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    rows.iter()
        .enumerate()
        .map(|(i, r)| {
            normalise_row(r).map_err(|e| {
                MotionError::NumericDegeneracy(format!("row {}: {}", i, e))
            })
        })
        .collect()
}

pub fn is_normalised(row: &[f64]) -> bool {
    (row.iter().sum::<f64>() - 1.0).abs() < NORMALISATION_TOL
}

/// Check that all rows share a width and return it.
pub fn feature_width(rows: &[Vec<f64>]) -> Result<usize> {
    let width = rows
        .first()
        .map(|r| r.len())
        .ok_or_else(|| MotionError::EmptyInput("feature rows".to_string()))?;
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(MotionError::DimensionMismatch {
            expected: width,
            got: bad.len(),
        });
    }
    Ok(width)
}

/// Immutable pair of training feature rows and their reference coordinates.
///
/// Fields are private: once built, a `TrainingSet` can only be read. Share it
/// across workers with [`TrainingSet::into_shared`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingSet {
    data: Vec<Vec<f64>>,
    embedding: Vec<Point2>,
    nfeatures: usize,
}

impl TrainingSet {
    /// Pair `data` (M×d) with `embedding` (M×2), row for row.
    pub fn new(data: Vec<Vec<f64>>, embedding: Vec<Point2>) -> Result<Self> {
        let nfeatures = feature_width(&data)?;
        if data.len() != embedding.len() {
            return Err(MotionError::DimensionMismatch {
                expected: data.len(),
                got: embedding.len(),
            });
        }
        if let Some(i) = embedding
            .iter()
            .position(|p| !(p[0].is_finite() && p[1].is_finite()))
        {
            return Err(MotionError::NumericDegeneracy(format!(
                "reference coordinate {} is not finite",
                i
            )));
        }
        debug!(
            "TrainingSet created with {} rows and {} features",
            data.len(),
            nfeatures
        );
        Ok(Self {
            data,
            embedding,
            nfeatures,
        })
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn nfeatures(&self) -> usize {
        self.nfeatures
    }

    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn embedding(&self) -> &[Point2] {
        &self.embedding
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    #[inline]
    pub fn coord(&self, i: usize) -> Point2 {
        self.embedding[i]
    }

    /// Coordinates and weights of the entries of `p` that are strictly positive.
    pub fn positive_neighbours(&self, p: &[f64]) -> (Vec<usize>, Vec<Point2>, Vec<f64>) {
        let mut idx = Vec::new();
        let mut coords = Vec::new();
        let mut weights = Vec::new();
        for (i, &w) in p.iter().enumerate() {
            if w > 0.0 {
                idx.push(i);
                coords.push(self.embedding[i]);
                weights.push(w);
            }
        }
        trace!("{} positive-affinity neighbours", idx.len());
        (idx, coords, weights)
    }
}
