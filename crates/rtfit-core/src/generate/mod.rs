//! Producing populations of trial parameter vectors.
//!
//! Two strategies share one contract: a uniform grid over the parameter
//! ranges, and a genetic algorithm with elitism, crossover, mutation and
//! recurrence detection. The generator decides *which* models to evaluate;
//! everything downstream treats the population as opaque.

pub mod genetic;
pub mod grid;
pub mod recurrence;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::params::{Individual, ParameterVector, Range, Scale};
use crate::store::FittingRun;

pub use genetic::{build_engine_state, EngineState, GeneticGenerator, PrngState};
pub use grid::GridGenerator;

/// Inputs shared by both generator variants.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Value range per free-parameter label; must cover every label
    pub ranges: BTreeMap<String, Range>,
    /// Axis scale per label (absent = linear)
    pub scales: BTreeMap<String, Scale>,
    /// Vectors seeding the first individuals of an initial genetic generation
    pub fixed_initial: Vec<ParameterVector>,
    /// Explicit grid point counts per label
    pub npoints: BTreeMap<String, usize>,
    /// Labels with higher weight receive extra grid resolution first
    pub weights: BTreeMap<String, f64>,
    /// Requested population size
    pub nmodels: usize,
}

/// A candidate that matched a previously evaluated individual within the
/// recurrence tolerances and was suppressed from the population.
#[derive(Debug, Clone)]
pub struct RecurrentModel {
    pub individual: Individual,
    /// Simulation whose parameters matched
    pub matched_simulation: String,
    /// That simulation's score, reused instead of re-simulating
    pub chi_squared: Option<f64>,
}

/// What a generator hands back to the runner.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub recurrent: Vec<RecurrentModel>,
    /// Serialized PRNG state after generation (genetic variant only)
    pub prng_state: Option<String>,
}

impl Population {
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }
}

/// The two generator variants behind one `generate` surface.
#[derive(Debug)]
pub enum ModelGenerator {
    Grid(GridGenerator),
    Genetic(GeneticGenerator),
}

impl ModelGenerator {
    pub fn generate(&mut self, run: &FittingRun, request: &GenerationRequest) -> Result<Population> {
        match self {
            ModelGenerator::Grid(generator) => generator.generate(run, request),
            ModelGenerator::Genetic(generator) => generator.generate(run, request),
        }
    }
}

/// Labels in run declaration order, checked against the request's ranges.
pub(crate) fn ordered_labels(run: &FittingRun, request: &GenerationRequest) -> Result<Vec<String>> {
    let labels = run.free_parameter_labels();
    for label in &labels {
        if !request.ranges.contains_key(label) {
            return Err(Error::Configuration(format!(
                "no range for free parameter '{label}'"
            )));
        }
    }
    for label in request.ranges.keys() {
        if !labels.contains(label) {
            return Err(Error::Configuration(format!(
                "range given for unknown label '{label}'"
            )));
        }
    }
    Ok(labels)
}

/// Map a value into the label's sampling space.
pub(crate) fn to_scale(value: f64, scale: Scale) -> f64 {
    match scale {
        Scale::Linear => value,
        Scale::Log => value.log10(),
    }
}

/// Inverse of [`to_scale`].
pub(crate) fn from_scale(value: f64, scale: Scale) -> f64 {
    match scale {
        Scale::Linear => value,
        Scale::Log => 10f64.powf(value),
    }
}

pub(crate) fn individual_name(index: usize) -> String {
    format!("individual_{index:04}")
}
