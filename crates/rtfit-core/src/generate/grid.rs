//! The uniform grid generator.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::generate::{from_scale, individual_name, ordered_labels, to_scale, GenerationRequest, Population};
use crate::params::{Individual, ParameterVector, Range, Scale};
use crate::store::FittingRun;
use crate::units::Quantity;

/// Produces the Cartesian product of per-label value grids.
///
/// Enumeration is row-major over the labels in declaration order (the first
/// label varies slowest) and is truncated to the requested population size in
/// that order. No randomness.
#[derive(Debug, Default)]
pub struct GridGenerator;

impl GridGenerator {
    pub fn new() -> Self {
        GridGenerator
    }

    pub fn generate(&mut self, run: &FittingRun, request: &GenerationRequest) -> Result<Population> {
        if request.ranges.is_empty() || request.nmodels == 0 {
            return Ok(Population::default());
        }
        let labels = ordered_labels(run, request)?;

        let npoints = allocate_points(&labels, request);
        let axes: Vec<Vec<f64>> = labels
            .iter()
            .map(|label| {
                let range = &request.ranges[label];
                let scale = request.scales.get(label).copied().unwrap_or_default();
                grid_values(range, scale, npoints[label])
            })
            .collect();

        let total: usize = axes.iter().map(Vec::len).product();
        let count = total.min(request.nmodels);
        tracing::debug!(total, kept = count, "enumerating parameter grid");

        // Strides so that the last label varies fastest.
        let mut strides = vec![1usize; axes.len()];
        for i in (0..axes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * axes[i + 1].len();
        }

        let mut individuals = Vec::with_capacity(count);
        for index in 0..count {
            let mut parameters = ParameterVector::new();
            for (axis, label) in labels.iter().enumerate() {
                let position = (index / strides[axis]) % axes[axis].len();
                let unit = request.ranges[label].min.unit;
                parameters.push(label.clone(), Quantity::new(axes[axis][position], unit));
            }
            individuals.push(Individual::new(individual_name(index), parameters));
        }

        Ok(Population {
            individuals,
            recurrent: Vec::new(),
            prng_state: None,
        })
    }
}

/// Point count per label: explicit counts win; otherwise points are grown
/// one label at a time, heavier-weighted labels first, while the grid still
/// fits in `nmodels`.
fn allocate_points(labels: &[String], request: &GenerationRequest) -> BTreeMap<String, usize> {
    let mut npoints: BTreeMap<String, usize> = labels
        .iter()
        .map(|label| {
            let explicit = request.npoints.get(label).copied();
            (label.clone(), explicit.unwrap_or(1))
        })
        .collect();
    if labels.iter().all(|l| request.npoints.contains_key(l)) {
        return npoints;
    }

    // Free labels ordered by descending weight, declaration order on ties.
    let mut free: Vec<&String> = labels
        .iter()
        .filter(|l| !request.npoints.contains_key(*l))
        .collect();
    free.sort_by(|a, b| {
        let wa = request.weights.get(*a).copied().unwrap_or(1.0);
        let wb = request.weights.get(*b).copied().unwrap_or(1.0);
        wb.partial_cmp(&wa).unwrap_or(std::cmp::Ordering::Equal)
    });

    loop {
        let product: usize = npoints.values().product();
        let mut grown = false;
        for label in &free {
            let current = npoints[*label];
            if product / current * (current + 1) <= request.nmodels {
                *npoints.get_mut(*label).unwrap() += 1;
                grown = true;
                break;
            }
        }
        if !grown {
            break;
        }
    }
    npoints
}

/// `n` values across the range, evenly spaced in the label's scale space.
fn grid_values(range: &Range, scale: Scale, n: usize) -> Vec<f64> {
    let (lo, hi) = range.bounds();
    let (slo, shi) = (to_scale(lo, scale), to_scale(hi, scale));
    if n <= 1 {
        return vec![from_scale((slo + shi) / 2.0, scale)];
    }
    let step = (shi - slo) / (n - 1) as f64;
    (0..n)
        .map(|i| from_scale(slo + i as f64 * step, scale))
        .collect()
}
