//! Run-level record of which datasets were used and which were skipped.
//!
//! Filled in while building a training set and handed back to the caller,
//! who decides where (and whether) to persist it.

use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BadDataset {
    pub name: String,
    pub reason: String,
    /// Mean squared pairwise divergence, when that was the cause.
    pub divergence_mean: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkingDataset {
    pub name: String,
    /// Rows kept after the activity filter and subsampling.
    pub subsampled: usize,
    /// Rows contributed to the training set.
    pub contributed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub bad: Vec<BadDataset>,
    pub working: Vec<WorkingDataset>,
}

impl RunDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bad(&mut self, name: &str, reason: impl Into<String>, divergence_mean: Option<f64>) {
        let reason = reason.into();
        warn!("Skipping dataset {}: {}", name, reason);
        self.bad.push(BadDataset {
            name: name.to_string(),
            reason,
            divergence_mean,
        });
    }

    pub fn record_working(&mut self, name: &str, subsampled: usize, contributed: usize) {
        self.working.push(WorkingDataset {
            name: name.to_string(),
            subsampled,
            contributed,
        });
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bad.iter().any(|b| b.name == name)
    }

    pub fn bad_names(&self) -> Vec<&str> {
        self.bad.iter().map(|b| b.name.as_str()).collect()
    }
}
