//! Watershed templates of a reference embedding and proportional sampling
//! from them.
//!
//! A template is the set of source rows whose reference coordinate falls in
//! one watershed basin of the embedding's density. Basins with fewer than
//! `min_template_length` members are discarded; the survivors are relabelled
//! 1..T in basin order and their members get that label (0 = discarded).

use log::{debug, info};

use crate::config::MotionParams;
use crate::core::Point2;
use crate::density::{knn_bandwidth, DensityField};
use crate::error::{MotionError, Result};
use crate::sampling::TemplateSampler;
use crate::watershed::{watershed, BasinLabels};

/// Source rows belonging to one retained basin.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    /// Label after discarding small basins, starting at 1.
    pub label: usize,
    /// Positions of the member rows in the source data.
    pub members: Vec<usize>,
}

impl Template {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct TemplateSet {
    pub templates: Vec<Template>,
    /// Template label of every source point, 0 when its basin was discarded.
    pub point_labels: Vec<usize>,
    pub density: DensityField,
    pub basins: BasinLabels,
}

impl TemplateSet {
    pub fn lengths(&self) -> Vec<usize> {
        self.templates.iter().map(Template::len).collect()
    }

    /// Members kept across every template.
    pub fn total_members(&self) -> usize {
        self.templates.iter().map(Template::len).sum()
    }
}

/// Segment the density of `coords` and group points by basin.
pub fn find_templates(coords: &[Point2], params: &MotionParams) -> Result<TemplateSet> {
    if coords.is_empty() {
        return Err(MotionError::EmptyInput("reference embedding".to_string()));
    }
    let sigma = if coords.len() > 1 {
        knn_bandwidth(coords, params.kd_neighbors)?
    } else {
        0.0
    };
    let density = DensityField::estimate(coords, sigma, params.density_grid_size)?;

    let size = density.size();
    let negated: Vec<f64> = density.to_flat().into_iter().map(|v| -v).collect();
    let basins = watershed(&negated, size, size, params.watershed_connectivity)?;

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); basins.nbasins()];
    for (i, &p) in coords.iter().enumerate() {
        let (row, col) = density.cell_of(p);
        members[basins.get(row, col) - 1].push(i);
    }

    let mut point_labels = vec![0usize; coords.len()];
    let mut templates = Vec::new();
    for group in members.into_iter().filter(|m| !m.is_empty()) {
        if group.len() < params.min_template_length {
            continue;
        }
        let label = templates.len() + 1;
        for &i in &group {
            point_labels[i] = label;
        }
        templates.push(Template {
            label,
            members: group,
        });
    }

    info!(
        "Found {} templates from {} basins ({} of {} points kept)",
        templates.len(),
        basins.nbasins(),
        point_labels.iter().filter(|&&l| l > 0).count(),
        coords.len()
    );
    Ok(TemplateSet {
        templates,
        point_labels,
        density,
        basins,
    })
}

/// Draw `target` rows (or every kept row, if fewer) proportionally from the
/// templates. Returns the positions of the drawn rows in the source data,
/// grouped by template.
pub fn sample_from_templates<S: TemplateSampler>(
    set: &TemplateSet,
    target: usize,
    sampler: &mut S,
) -> Vec<usize> {
    let quotas = sampler.allocate(&set.lengths(), target);
    let mut picked = Vec::with_capacity(quotas.iter().sum());
    for (template, &quota) in set.templates.iter().zip(&quotas) {
        if quota == 0 {
            continue;
        }
        for k in sampler.draw(template.len(), quota) {
            picked.push(template.members[k]);
        }
    }
    debug!(
        "Sampled {} rows from {} templates (target {})",
        picked.len(),
        set.templates.len(),
        target
    );
    picked
}
