//! Marker-based watershed segmentation of a 2-D grid.
//!
//! Markers are the regional minima of the image (plateaus included): every
//! connected set of equal-valued cells with no strictly lower neighbour gets
//! its own label, numbered 1..K in scan order. Labels then spread by a
//! priority flood ordered by cell value, first come first served on ties,
//! until every cell carries a basin label. No watershed lines are drawn.
//!
//! Connectivity `1` uses the 4-neighbourhood; anything larger uses the
//! 8-neighbourhood.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use log::debug;
use ordered_float::OrderedFloat;

use crate::error::{MotionError, Result};

const EDGE: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const FULL: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Basin label per grid cell (row-major). Labels run from 1 to `nbasins`.
#[derive(Clone, Debug)]
pub struct BasinLabels {
    labels: Vec<usize>,
    nrows: usize,
    ncols: usize,
    nbasins: usize,
}

impl BasinLabels {
    pub fn get(&self, row: usize, col: usize) -> usize {
        self.labels[row * self.ncols + col]
    }

    pub fn nbasins(&self) -> usize {
        self.nbasins
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.labels
    }

    /// Number of grid cells per basin; index 0 is basin 1.
    pub fn areas(&self) -> Vec<usize> {
        let mut areas = vec![0; self.nbasins];
        for &l in &self.labels {
            areas[l - 1] += 1;
        }
        areas
    }
}

struct Grid {
    nrows: usize,
    ncols: usize,
    offsets: &'static [(isize, isize)],
}

impl Grid {
    fn neighbours(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let (r, c) = ((idx / self.ncols) as isize, (idx % self.ncols) as isize);
        self.offsets.iter().filter_map(move |&(dr, dc)| {
            let (nr, nc) = (r + dr, c + dc);
            if nr < 0 || nc < 0 || nr >= self.nrows as isize || nc >= self.ncols as isize {
                None
            } else {
                Some(nr as usize * self.ncols + nc as usize)
            }
        })
    }
}

/// Label regional minima of `image`; returns the label grid (0 = unlabelled)
/// and the number of minima.
fn regional_minima(image: &[f64], grid: &Grid) -> (Vec<usize>, usize) {
    let n = image.len();
    let mut labels = vec![0usize; n];
    let mut visited = vec![false; n];
    let mut next = 0;
    let mut component: Vec<usize> = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let level = image[start];
        let mut is_minimum = true;
        component.clear();
        visited[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            for nb in grid.neighbours(idx) {
                if image[nb] < level {
                    is_minimum = false;
                } else if image[nb] == level && !visited[nb] {
                    visited[nb] = true;
                    queue.push_back(nb);
                }
            }
        }
        if is_minimum {
            next += 1;
            for &idx in &component {
                labels[idx] = next;
            }
        }
    }
    (labels, next)
}

/// Watershed of a row-major `nrows × ncols` image.
pub fn watershed(image: &[f64], nrows: usize, ncols: usize, connectivity: usize) -> Result<BasinLabels> {
    if nrows == 0 || ncols == 0 {
        return Err(MotionError::EmptyInput("watershed of an empty grid".to_string()));
    }
    if image.len() != nrows * ncols {
        return Err(MotionError::DimensionMismatch {
            expected: nrows * ncols,
            got: image.len(),
        });
    }
    if image.iter().any(|v| v.is_nan()) {
        return Err(MotionError::NumericDegeneracy(
            "NaN cell in watershed image".to_string(),
        ));
    }

    let grid = Grid {
        nrows,
        ncols,
        offsets: if connectivity <= 1 { &EDGE } else { &FULL },
    };
    let (mut labels, nbasins) = regional_minima(image, &grid);

    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize, usize)>> = BinaryHeap::new();
    let mut age = 0usize;
    let mut queued = vec![false; image.len()];
    for idx in 0..image.len() {
        if labels[idx] != 0 {
            queued[idx] = true;
            heap.push(Reverse((OrderedFloat(image[idx]), age, idx)));
            age += 1;
        }
    }

    while let Some(Reverse((_, _, idx))) = heap.pop() {
        let label = labels[idx];
        for nb in grid.neighbours(idx) {
            if queued[nb] {
                continue;
            }
            queued[nb] = true;
            labels[nb] = label;
            heap.push(Reverse((OrderedFloat(image[nb]), age, nb)));
            age += 1;
        }
    }

    debug!(
        "Watershed on {}x{} grid (connectivity {}): {} basins",
        nrows, ncols, connectivity, nbasins
    );
    Ok(BasinLabels {
        labels,
        nrows,
        ncols,
        nbasins,
    })
}
