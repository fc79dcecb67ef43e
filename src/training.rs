//! Training-set construction across datasets.
//!
//! For every dataset the provider yields:
//!
//! 1. rows below the activity threshold (and masked rows) are dropped,
//!    and up to `training_num_points` of the rest are taken at an even stride;
//! 2. their row sums become amplitudes and the rows are normalised;
//! 3. a dataset whose rows are indistinguishable (mean squared pairwise
//!    divergence below `bad_divergence_mean`) is recorded as bad and skipped;
//! 4. a mini reference fit embeds the subsample, templates are found in that
//!    embedding and `round(training_set_size / datasets)` rows are drawn from
//!    them proportionally.
//!
//! The mini fits run under a scoped override: `training_perplexity`, and
//! Barnes-Hut quality for t-SNE. The caller's parameters are restored when the
//! build returns, successfully or not.

use log::{debug, info, warn};

use crate::config::{MotionParams, ReferenceMethod, TsneQuality};
use crate::core::{feature_width, normalise_row, row_sums, Point2, TrainingSet};
use crate::diagnostics::RunDiagnostics;
use crate::divergence::mean_squared_divergence;
use crate::error::{MotionError, Result};
use crate::sampling::{ProportionalSampler, TemplateSampler};
use crate::templates::{find_templates, sample_from_templates};

/// Source of per-dataset feature matrices (rows of non-negative amplitudes).
pub trait FeatureProvider {
    /// Dataset names in processing order.
    fn datasets(&self) -> Vec<String>;

    fn load(&self, name: &str) -> Result<Vec<Vec<f64>>>;

    /// Rows to exclude regardless of amplitude, if any.
    fn mask(&self, _name: &str) -> Option<Vec<bool>> {
        None
    }
}

/// Datasets held in memory, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFeatures {
    entries: Vec<(String, Vec<Vec<f64>>, Option<Vec<bool>>)>,
}

impl InMemoryFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, name: &str, rows: Vec<Vec<f64>>) -> Self {
        self.entries.push((name.to_string(), rows, None));
        self
    }

    pub fn with_masked_dataset(mut self, name: &str, rows: Vec<Vec<f64>>, mask: Vec<bool>) -> Self {
        self.entries.push((name.to_string(), rows, Some(mask)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FeatureProvider for InMemoryFeatures {
    fn datasets(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _, _)| n.clone()).collect()
    }

    fn load(&self, name: &str) -> Result<Vec<Vec<f64>>> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, rows, _)| rows.clone())
            .ok_or_else(|| MotionError::EmptyInput(format!("no dataset named '{}'", name)))
    }

    fn mask(&self, name: &str) -> Option<Vec<bool>> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .and_then(|(_, _, m)| m.clone())
    }
}

/// External manifold-learning fit producing a 2-D embedding row for row.
pub trait ReferenceFit {
    fn method(&self) -> ReferenceMethod;

    fn fit(&self, rows: &[Vec<f64>], params: &MotionParams) -> Result<Vec<Point2>>;
}

/// Run `fit` and check its output is aligned and finite.
pub fn validated_fit<F>(fit: &F, rows: &[Vec<f64>], params: &MotionParams) -> Result<Vec<Point2>>
where
    F: ReferenceFit + ?Sized,
{
    if fit.method() != params.method {
        debug!(
            "Reference fit reports method {} while parameters ask for {}",
            fit.method(),
            params.method
        );
    }
    let y = fit.fit(rows, params)?;
    if y.len() != rows.len() {
        return Err(MotionError::ReferenceFit(format!(
            "fit returned {} coordinates for {} rows",
            y.len(),
            rows.len()
        )));
    }
    if let Some(i) = y.iter().position(|p| !(p[0].is_finite() && p[1].is_finite())) {
        return Err(MotionError::ReferenceFit(format!(
            "fit returned a non-finite coordinate at row {}",
            i
        )));
    }
    Ok(y)
}

/// Indices of up to `num_points` rows at or above `activity_threshold`,
/// evenly strided over the valid rows. Zero-sum rows are never valid.
/// `exclude[i] == true` drops row `i`.
pub fn subsample_indices(
    sums: &[f64],
    num_points: usize,
    activity_threshold: f64,
    exclude: Option<&[bool]>,
) -> Vec<usize> {
    let valid: Vec<usize> = sums
        .iter()
        .enumerate()
        .filter(|&(i, &s)| {
            s >= activity_threshold && s > 0.0 && !exclude.and_then(|m| m.get(i).copied()).unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();

    if valid.len() <= num_points {
        if valid.len() < num_points {
            warn!(
                "Only {} valid rows for {} requested subsample points, using all of them",
                valid.len(),
                num_points
            );
        }
        return valid;
    }
    let stride = valid.len() / num_points;
    (0..num_points).map(|k| valid[k * stride]).collect()
}

/// Assembled training rows (normalised) with their amplitudes.
#[derive(Clone, Debug, Default)]
pub struct TrainingSamples {
    pub data: Vec<Vec<f64>>,
    pub amps: Vec<f64>,
    pub diagnostics: RunDiagnostics,
}

impl TrainingSamples {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Builds training samples from a feature provider.
pub struct TrainingSetBuilder {
    params: MotionParams,
}

impl TrainingSetBuilder {
    pub fn new(params: MotionParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    /// Training rows per dataset for `datasets` datasets.
    pub fn per_dataset(&self, datasets: usize) -> Result<usize> {
        if datasets == 0 {
            return Err(MotionError::EmptyInput("no datasets to build a training set from".to_string()));
        }
        let per = (self.params.training_set_size as f64 / datasets as f64).round_ties_even() as usize;
        if per > self.params.training_num_points {
            return Err(MotionError::QuotaExceedsBudget {
                required: per,
                budget: self.params.training_num_points,
            });
        }
        Ok(per)
    }

    pub fn build<P, F>(&mut self, provider: &P, fit: &F) -> Result<TrainingSamples>
    where
        P: FeatureProvider + ?Sized,
        F: ReferenceFit + ?Sized,
    {
        let names = provider.datasets();
        let per = self.per_dataset(names.len())?;
        info!(
            "Building training set from {} datasets, {} samples each",
            names.len(),
            per
        );

        let mut sampler = ProportionalSampler::new(self.params.seed);
        let mut samples = TrainingSamples::default();

        let scoped = self.params.scoped(|p| {
            p.perplexity = p.training_perplexity;
            if p.method == ReferenceMethod::Tsne && p.tsne_quality != TsneQuality::BarnesHut {
                info!("Using Barnes-Hut t-SNE while subsampling");
                p.tsne_quality = TsneQuality::BarnesHut;
            }
        });

        for (i, name) in names.iter().enumerate() {
            info!(
                "Finding training set contributions from dataset {}/{}: {}",
                i + 1,
                names.len(),
                name
            );
            let raw = provider.load(name)?;
            let mask = provider.mask(name);
            if let Some((rows, amps)) = dataset_contribution(
                name,
                &raw,
                mask.as_deref(),
                per,
                fit,
                &scoped,
                &mut sampler,
                &mut samples.diagnostics,
            )? {
                samples.data.extend(rows);
                samples.amps.extend(amps);
            }
        }
        drop(scoped);

        // rows that never received a sample carry no amplitude
        let before = samples.data.len();
        let (data, amps): (Vec<Vec<f64>>, Vec<f64>) = samples
            .data
            .into_iter()
            .zip(samples.amps)
            .filter(|(row, _)| row.iter().sum::<f64>() != 0.0)
            .unzip();
        samples.data = data;
        samples.amps = amps;
        if samples.data.len() < before {
            debug!("Dropped {} zero-sum training rows", before - samples.data.len());
        }
        if !samples.data.is_empty() {
            feature_width(&samples.data)?;
        }

        info!(
            "Training set has {} rows ({} datasets used, {} skipped)",
            samples.data.len(),
            samples.diagnostics.working.len(),
            samples.diagnostics.bad.len()
        );
        Ok(samples)
    }
}

#[allow(clippy::too_many_arguments)]
fn dataset_contribution<F, S>(
    name: &str,
    raw: &[Vec<f64>],
    mask: Option<&[bool]>,
    per: usize,
    fit: &F,
    params: &MotionParams,
    sampler: &mut S,
    diagnostics: &mut RunDiagnostics,
) -> Result<Option<(Vec<Vec<f64>>, Vec<f64>)>>
where
    F: ReferenceFit + ?Sized,
    S: TemplateSampler,
{
    if raw.is_empty() {
        diagnostics.record_bad(name, "dataset has no rows", None);
        return Ok(None);
    }
    feature_width(raw)?;

    let sums = row_sums(raw);
    let picked = subsample_indices(&sums, params.training_num_points, params.activity_threshold, mask);
    if picked.is_empty() {
        diagnostics.record_bad(name, "no rows above the activity threshold", None);
        return Ok(None);
    }
    let amps: Vec<f64> = picked.iter().map(|&i| sums[i]).collect();
    let rows: Vec<Vec<f64>> = picked
        .iter()
        .map(|&i| normalise_row(&raw[i]))
        .collect::<Result<_>>()?;

    let spread = mean_squared_divergence(&rows, params.probability_features);
    if spread < params.bad_divergence_mean {
        diagnostics.record_bad(
            name,
            format!("mean squared divergence {:.3e} below {:.1e}", spread, params.bad_divergence_mean),
            Some(spread),
        );
        return Ok(None);
    }

    let y = validated_fit(fit, &rows, params)?;
    let set = find_templates(&y, params)?;
    let chosen = sample_from_templates(&set, per, sampler);

    let data: Vec<Vec<f64>> = chosen.iter().map(|&k| rows[k].clone()).collect();
    let chosen_amps: Vec<f64> = chosen.iter().map(|&k| amps[k]).collect();
    debug!(
        "Dataset {}: {} subsampled rows, {} templates, {} contributed",
        name,
        rows.len(),
        set.templates.len(),
        data.len()
    );
    diagnostics.record_working(name, rows.len(), data.len());
    Ok(Some((data, chosen_amps)))
}

/// Build training samples with a fresh [`TrainingSetBuilder`].
pub fn build_training_set<P, F>(provider: &P, fit: &F, params: &MotionParams) -> Result<TrainingSamples>
where
    P: FeatureProvider + ?Sized,
    F: ReferenceFit + ?Sized,
{
    TrainingSetBuilder::new(params.clone())?.build(provider, fit)
}

/// Final reference fit over the assembled samples.
pub fn fit_reference<F>(samples: &TrainingSamples, fit: &F, params: &MotionParams) -> Result<TrainingSet>
where
    F: ReferenceFit + ?Sized,
{
    params.validate()?;
    if samples.is_empty() {
        return Err(MotionError::EmptyInput("training samples".to_string()));
    }
    info!(
        "Running {} reference fit on {} training rows",
        params.method,
        samples.len()
    );
    let y = validated_fit(fit, &samples.data, params)?;
    TrainingSet::new(samples.data.clone(), y)
}
