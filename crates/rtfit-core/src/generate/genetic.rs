//! The genetic generator.
//!
//! The first generation samples the ranges (log-)uniformly, optionally
//! seeded with caller-fixed vectors. Later generations evolve the scored
//! population of the last finalized genetic generation through tournament
//! selection, single-point crossover and bounded per-label mutation. Every
//! produced candidate is checked against the full evaluated history; a
//! recurrent candidate is suppressed and its previous χ² reused, and the
//! population is never resampled to make up the shortfall.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::config::{OptimizerConfig, RecurrenceConfig};
use crate::error::{Error, Result};
use crate::generate::recurrence::is_recurrent;
use crate::generate::{
    from_scale, individual_name, ordered_labels, to_scale, GenerationRequest, Population,
    RecurrentModel,
};
use crate::params::{Individual, ParameterVector, Scale};
use crate::store::FittingRun;
use crate::units::{Quantity, Unit};

/// PRNG state persisted with the run; restoring it makes restarts
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrngState {
    pub seed: u64,
    pub word_pos: u128,
}

impl PrngState {
    pub fn capture(seed: u64, rng: &ChaCha8Rng) -> Self {
        PrngState {
            seed,
            word_pos: rng.get_word_pos(),
        }
    }

    pub fn restore(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_word_pos(self.word_pos);
        rng
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One member of the engine's population, scored once its generation
/// finalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub individual_name: String,
    /// Simulation that evaluated this member; `None` for recurrent members
    pub simulation_name: Option<String>,
    /// Values per label, in run declaration order and run units
    pub values: Vec<f64>,
    pub score: Option<f64>,
}

/// Engine state persisted at generation finalization.
///
/// The run-level copy always equals the snapshot inside the last finalized
/// genetic generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub generation_index: u32,
    pub labels: Vec<String>,
    pub population: Vec<ScoredMember>,
}

impl EngineState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Evolves populations of parameter vectors.
#[derive(Debug)]
pub struct GeneticGenerator {
    optimizer: OptimizerConfig,
    recurrence: RecurrenceConfig,
    seed: u64,
}

impl GeneticGenerator {
    pub fn new(optimizer: OptimizerConfig, recurrence: RecurrenceConfig, seed: u64) -> Self {
        GeneticGenerator {
            optimizer,
            recurrence,
            seed,
        }
    }

    pub fn generate(&mut self, run: &FittingRun, request: &GenerationRequest) -> Result<Population> {
        if request.ranges.is_empty() || request.nmodels == 0 {
            return Ok(Population::default());
        }
        let labels = ordered_labels(run, request)?;
        let units: Vec<Unit> = labels
            .iter()
            .map(|label| request.ranges[label].min.unit)
            .collect();
        let scales: Vec<Scale> = labels
            .iter()
            .map(|label| request.scales.get(label).copied().unwrap_or_default())
            .collect();
        let bounds: Vec<(f64, f64)> = labels
            .iter()
            .map(|label| request.ranges[label].bounds())
            .collect();

        let (mut rng, seed) = self.rng_for(run)?;

        let raw = if run.has_initial_genetic_generation()? {
            self.evolve(run, &labels, &scales, &bounds, request.nmodels, &mut rng)?
        } else {
            self.sample_initial(request, &labels, &units, &scales, &bounds, &mut rng)?
        };

        let population = self.filter_recurrent(run, raw, &labels, &units)?;
        let prng_state = PrngState::capture(seed, &rng).to_json()?;
        Ok(Population {
            prng_state: Some(prng_state),
            ..population
        })
    }

    /// Restore the persisted PRNG, or seed a fresh one for a new run.
    fn rng_for(&self, run: &FittingRun) -> Result<(ChaCha8Rng, u64)> {
        let path = run.main_prng_path();
        if path.exists() {
            let state = PrngState::from_json(&std::fs::read_to_string(&path)?)?;
            Ok((state.restore(), state.seed))
        } else {
            Ok((ChaCha8Rng::seed_from_u64(self.seed), self.seed))
        }
    }

    /// First generation: (log-)uniform draws, with fixed seed vectors first.
    fn sample_initial(
        &self,
        request: &GenerationRequest,
        labels: &[String],
        units: &[Unit],
        scales: &[Scale],
        bounds: &[(f64, f64)],
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Vec<f64>>> {
        let mut candidates = Vec::with_capacity(request.nmodels);
        for i in 0..request.nmodels {
            if let Some(fixed) = request.fixed_initial.get(i) {
                candidates.push(vector_to_values(fixed, labels, units)?);
                continue;
            }
            let values = labels
                .iter()
                .enumerate()
                .map(|(axis, _)| {
                    let (lo, hi) = bounds[axis];
                    let (slo, shi) = (to_scale(lo, scales[axis]), to_scale(hi, scales[axis]));
                    from_scale(rng.gen_range(slo..=shi), scales[axis])
                })
                .collect();
            candidates.push(values);
        }
        Ok(candidates)
    }

    /// Later generations: elitism + tournament + crossover + mutation over
    /// the last finalized engine population.
    fn evolve(
        &self,
        run: &FittingRun,
        labels: &[String],
        scales: &[Scale],
        bounds: &[(f64, f64)],
        nmodels: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<Vec<f64>>> {
        let engine_path = run.main_engine_path();
        if !engine_path.exists() {
            return Err(Error::Configuration(
                "genetic run has generations but no main engine state".to_string(),
            ));
        }
        let engine = EngineState::from_json(&std::fs::read_to_string(&engine_path)?)?;
        if engine.labels != labels {
            return Err(Error::Configuration(format!(
                "engine state labels [{}] do not match the run's [{}]",
                engine.labels.join(", "),
                labels.join(", ")
            )));
        }
        if engine.population.is_empty() {
            return Err(Error::Configuration(
                "engine state holds an empty population".to_string(),
            ));
        }

        let mut parents = engine.population.clone();
        parents.sort_by(|a, b| {
            score_of(a)
                .partial_cmp(&score_of(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut candidates = Vec::with_capacity(nmodels);

        // Elites pass unchanged; recurrence detection reuses their scores
        // instead of re-simulating them.
        for elite in parents.iter().take(self.optimizer.elitism.min(nmodels)) {
            candidates.push(elite.values.clone());
        }

        while candidates.len() < nmodels {
            let a = self.tournament(&parents, rng);
            let b = self.tournament(&parents, rng);
            let mut child = self.crossover(&parents[a].values, &parents[b].values, rng);
            self.mutate(&mut child, scales, bounds, rng);
            candidates.push(child);
        }
        Ok(candidates)
    }

    /// Index of the best member among `tournament_size` random picks.
    fn tournament(&self, parents: &[ScoredMember], rng: &mut ChaCha8Rng) -> usize {
        let mut best = rng.gen_range(0..parents.len());
        for _ in 1..self.optimizer.tournament_size.max(1) {
            let challenger = rng.gen_range(0..parents.len());
            if score_of(&parents[challenger]) < score_of(&parents[best]) {
                best = challenger;
            }
        }
        best
    }

    /// Single-point crossover on the label order.
    fn crossover(&self, a: &[f64], b: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
        if a.len() < 2 || rng.gen::<f64>() >= self.optimizer.crossover_rate {
            return a.to_vec();
        }
        let point = rng.gen_range(1..a.len());
        let mut child = a[..point].to_vec();
        child.extend_from_slice(&b[point..]);
        child
    }

    /// Per-label Gaussian (linear scale) or log-Gaussian (log scale) draw,
    /// clamped to the range.
    fn mutate(&self, values: &mut [f64], scales: &[Scale], bounds: &[(f64, f64)], rng: &mut ChaCha8Rng) {
        for (axis, value) in values.iter_mut().enumerate() {
            if rng.gen::<f64>() >= self.optimizer.mutation_rate {
                continue;
            }
            let (lo, hi) = bounds[axis];
            let (slo, shi) = (to_scale(lo, scales[axis]), to_scale(hi, scales[axis]));
            let sigma = (shi - slo).abs() * self.optimizer.mutation_sigma;
            if sigma == 0.0 {
                continue;
            }
            let normal = Normal::new(to_scale(*value, scales[axis]), sigma)
                .expect("sigma is finite and positive");
            let drawn = normal.sample(rng).clamp(slo.min(shi), slo.max(shi));
            *value = from_scale(drawn, scales[axis]);
        }
    }

    /// Suppress candidates matching the evaluated history or an earlier
    /// candidate of this population.
    fn filter_recurrent(
        &self,
        run: &FittingRun,
        raw: Vec<Vec<f64>>,
        labels: &[String],
        units: &[Unit],
    ) -> Result<Population> {
        let history = if self.recurrence.check {
            run.evaluated_models()?
        } else {
            Vec::new()
        };

        let mut individuals: Vec<Individual> = Vec::new();
        let mut recurrent = Vec::new();
        for (index, values) in raw.into_iter().enumerate() {
            let candidate = Individual::new(individual_name(index), values_to_vector(&values, labels, units));
            if !self.recurrence.check {
                individuals.push(candidate);
                continue;
            }

            if let Some(model) = history
                .iter()
                .find(|m| is_recurrent(&candidate.parameters, &m.parameters, &self.recurrence))
            {
                tracing::debug!(
                    individual = %candidate.name,
                    matched = %model.simulation_name,
                    "suppressing recurrent individual"
                );
                recurrent.push(RecurrentModel {
                    individual: candidate,
                    matched_simulation: model.simulation_name.clone(),
                    chi_squared: model.chi_squared,
                });
                continue;
            }

            if let Some(twin) = individuals
                .iter()
                .find(|other| is_recurrent(&candidate.parameters, &other.parameters, &self.recurrence))
            {
                tracing::debug!(
                    individual = %candidate.name,
                    matched = %twin.name,
                    "suppressing duplicate within the population"
                );
                recurrent.push(RecurrentModel {
                    matched_simulation: twin.name.clone(),
                    individual: candidate,
                    chi_squared: None,
                });
                continue;
            }

            individuals.push(candidate);
        }

        Ok(Population {
            individuals,
            recurrent,
            prng_state: None,
        })
    }
}

fn score_of(member: &ScoredMember) -> f64 {
    member.score.unwrap_or(f64::INFINITY)
}

fn vector_to_values(vector: &ParameterVector, labels: &[String], units: &[Unit]) -> Result<Vec<f64>> {
    labels
        .iter()
        .zip(units)
        .map(|(label, unit)| {
            let value = vector.get(label).ok_or_else(|| {
                Error::Configuration(format!("fixed initial vector misses label '{label}'"))
            })?;
            Ok(value.to(*unit)?.value)
        })
        .collect()
}

fn values_to_vector(values: &[f64], labels: &[String], units: &[Unit]) -> ParameterVector {
    labels
        .iter()
        .zip(units)
        .zip(values)
        .map(|((label, unit), value)| (label.clone(), Quantity::new(*value, *unit)))
        .collect()
}

/// Assemble the engine state of a finalized generation: every accepted
/// individual with its score, plus recurrent members carrying their reused
/// scores so selection still sees them.
pub fn build_engine_state(
    generation_index: u32,
    labels: Vec<String>,
    units: &[Unit],
    scored: impl IntoIterator<Item = (Individual, Option<String>, Option<f64>)>,
) -> Result<EngineState> {
    let mut population = Vec::new();
    for (individual, simulation_name, score) in scored {
        let values = vector_to_values(&individual.parameters, &labels, units)?;
        population.push(ScoredMember {
            individual_name: individual.name,
            simulation_name,
            values,
            score,
        });
    }
    Ok(EngineState {
        generation_index,
        labels,
        population,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationMethod;
    use crate::params::Range;
    use crate::scene::DustGridSpec;
    use crate::store::generation::{GenerationInfo, GenerationStatus};
    use crate::store::{FreeParameter, RepresentationSpec, RunDefinition, INITIAL_GENERATION};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn definition() -> RunDefinition {
        RunDefinition {
            name: "test".to_string(),
            object_name: "Test".to_string(),
            ski_template: "template.ski".to_string(),
            free_parameters: vec![
                FreeParameter {
                    label: "dust_mass".to_string(),
                    unit: Unit::SolarMass,
                    first_guess: Quantity::new(3e7, Unit::SolarMass),
                    default_range: Range::new(
                        Quantity::new(1e7, Unit::SolarMass),
                        Quantity::new(9e7, Unit::SolarMass),
                    )
                    .unwrap(),
                    scale: Scale::Log,
                },
                FreeParameter {
                    label: "ionizing".to_string(),
                    unit: Unit::None,
                    first_guess: Quantity::dimensionless(0.5),
                    default_range: Range::new(
                        Quantity::dimensionless(0.1),
                        Quantity::dimensionless(1.0),
                    )
                    .unwrap(),
                    scale: Scale::Linear,
                },
            ],
            input_dir: "input".to_string(),
            input_maps: vec![],
            wavelength_grids: vec!["wavelengths_level0.dat".to_string()],
            representations: vec![RepresentationSpec {
                name: "initial".to_string(),
                dust_grid: DustGridSpec::file_tree("tree.dat"),
                ncells: None,
            }],
        }
    }

    fn request(nmodels: usize) -> GenerationRequest {
        let mut ranges = BTreeMap::new();
        ranges.insert(
            "dust_mass".to_string(),
            Range::new(
                Quantity::new(1e7, Unit::SolarMass),
                Quantity::new(9e7, Unit::SolarMass),
            )
            .unwrap(),
        );
        ranges.insert(
            "ionizing".to_string(),
            Range::new(Quantity::dimensionless(0.1), Quantity::dimensionless(1.0)).unwrap(),
        );
        let mut scales = BTreeMap::new();
        scales.insert("dust_mass".to_string(), Scale::Log);
        scales.insert("ionizing".to_string(), Scale::Linear);
        GenerationRequest {
            ranges,
            scales,
            fixed_initial: vec![],
            npoints: BTreeMap::new(),
            weights: BTreeMap::new(),
            nmodels,
        }
    }

    fn generator(seed: u64) -> GeneticGenerator {
        GeneticGenerator::new(OptimizerConfig::default(), RecurrenceConfig::default(), seed)
    }

    #[test]
    fn test_initial_sampling_within_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let run = FittingRun::create(dir.path(), definition()).unwrap();
        let population = generator(7).generate(&run, &request(20)).unwrap();
        assert_eq!(population.len(), 20);
        for individual in &population.individuals {
            let mass = individual.parameters.get("dust_mass").unwrap().value;
            let ionizing = individual.parameters.get("ionizing").unwrap().value;
            assert!((1e7..=9e7).contains(&mass));
            assert!((0.1..=1.0).contains(&ionizing));
        }
        assert!(population.prng_state.is_some());
    }

    #[test]
    fn test_initial_sampling_is_deterministic() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let run_a = FittingRun::create(dir_a.path(), definition()).unwrap();
        let run_b = FittingRun::create(dir_b.path(), definition()).unwrap();
        let pop_a = generator(11).generate(&run_a, &request(10)).unwrap();
        let pop_b = generator(11).generate(&run_b, &request(10)).unwrap();
        assert_eq!(pop_a.individuals, pop_b.individuals);
    }

    #[test]
    fn test_fixed_initial_seeds_first_individuals() {
        let dir = tempfile::tempdir().unwrap();
        let run = FittingRun::create(dir.path(), definition()).unwrap();
        let mut fixed = ParameterVector::new();
        fixed.push("dust_mass", Quantity::new(5e7, Unit::SolarMass));
        fixed.push("ionizing", Quantity::dimensionless(0.25));
        let mut req = request(5);
        req.fixed_initial = vec![fixed.clone()];
        let population = generator(3).generate(&run, &req).unwrap();
        assert_eq!(population.individuals[0].parameters, fixed);
    }

    #[test]
    fn test_duplicate_seed_is_suppressed() {
        // Two identical seeded vectors: one survives, no duplicate
        // submission, and the population may shrink.
        let dir = tempfile::tempdir().unwrap();
        let run = FittingRun::create(dir.path(), definition()).unwrap();
        let mut fixed = ParameterVector::new();
        fixed.push("dust_mass", Quantity::new(5e7, Unit::SolarMass));
        fixed.push("ionizing", Quantity::dimensionless(0.25));
        let mut req = request(2);
        req.fixed_initial = vec![fixed.clone(), fixed.clone()];
        let population = generator(3).generate(&run, &req).unwrap();
        assert_eq!(population.len(), 1);
        assert_eq!(population.recurrent.len(), 1);
        assert_eq!(
            population.recurrent[0].matched_simulation,
            population.individuals[0].name
        );
        assert!(population.recurrent[0].chi_squared.is_none());
    }

    /// A run whose initial generation is finalized with known scores.
    fn scored_run(dir: &std::path::Path, scores: &[f64]) -> FittingRun {
        let run = FittingRun::create(dir, definition()).unwrap();
        let req = request(scores.len());
        let mut generator = generator(19);
        let population = generator.generate(&run, &req).unwrap();
        assert_eq!(population.len(), scores.len());

        let info = GenerationInfo {
            name: INITIAL_GENERATION.to_string(),
            index: None,
            method: GenerationMethod::Genetic,
            wavelength_grid_level: 0,
            representation: "initial".to_string(),
            npackages: 100_000,
            selfabsorption: false,
            transient_heating: false,
            nsimulations: scores.len(),
            creation_time: Utc::now(),
            finishing_time: None,
            status: GenerationStatus::Planned,
        };
        let mut generation = run
            .create_generation(info, &req.ranges, &req.scales)
            .unwrap();

        let units: Vec<Unit> = run.parameter_units().into_iter().map(|(_, u)| u).collect();
        let mut scored = Vec::new();
        for (i, individual) in population.individuals.iter().enumerate() {
            let simulation_name = format!("sim_{i}");
            generation
                .append_individual(&simulation_name, &individual.name)
                .unwrap();
            generation
                .append_parameters(&simulation_name, &individual.parameters)
                .unwrap();
            generation
                .append_chi_squared(&simulation_name, scores[i])
                .unwrap();
            scored.push((individual.clone(), Some(simulation_name), Some(scores[i])));
        }
        let engine = build_engine_state(0, run.free_parameter_labels(), &units, scored).unwrap();
        run.write_state_file(&run.main_engine_path(), &engine.to_json().unwrap())
            .unwrap();
        run.write_state_file(&run.main_prng_path(), &population.prng_state.unwrap())
            .unwrap();
        generation
            .finalize(GenerationStatus::Finalized, Utc::now())
            .unwrap();
        run
    }

    #[test]
    fn test_evolution_reuses_elite_scores() {
        let dir = tempfile::tempdir().unwrap();
        let run = scored_run(dir.path(), &[5.0, 1.0, 9.0, 3.0, 7.0, 2.0]);
        let population = generator(19).generate(&run, &request(6)).unwrap();

        // The two elites (scores 1.0 and 2.0) recur and carry their scores.
        let reused: Vec<f64> = population
            .recurrent
            .iter()
            .filter_map(|r| r.chi_squared)
            .collect();
        assert!(reused.contains(&1.0));
        assert!(reused.contains(&2.0));
        // Nothing is resampled to compensate for the suppressed elites.
        assert_eq!(population.len() + population.recurrent.len(), 6);
    }

    #[test]
    fn test_evolution_respects_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let run = scored_run(dir.path(), &[5.0, 1.0, 9.0, 3.0]);
        for seed in [19u64, 20, 21] {
            let mut g = GeneticGenerator::new(
                OptimizerConfig {
                    mutation_rate: 1.0,
                    ..Default::default()
                },
                RecurrenceConfig::default(),
                seed,
            );
            let population = g.generate(&run, &request(8)).unwrap();
            for individual in &population.individuals {
                let mass = individual.parameters.get("dust_mass").unwrap().value;
                let ionizing = individual.parameters.get("ionizing").unwrap().value;
                assert!((1e7..=9e7).contains(&mass), "mass {mass} out of range");
                assert!((0.1..=1.0).contains(&ionizing), "ionizing {ionizing} out of range");
            }
        }
    }

    #[test]
    fn test_prng_state_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let _: f64 = rng.gen();
        let _: f64 = rng.gen();
        let state = PrngState::capture(99, &rng);
        let mut restored = state.restore();
        let mut original = rng;
        for _ in 0..16 {
            assert_eq!(original.gen::<u64>(), restored.gen::<u64>());
        }
    }

    #[test]
    fn test_empty_ranges_give_empty_population() {
        let dir = tempfile::tempdir().unwrap();
        let run = FittingRun::create(dir.path(), definition()).unwrap();
        let req = GenerationRequest {
            ranges: BTreeMap::new(),
            scales: BTreeMap::new(),
            fixed_initial: vec![],
            npoints: BTreeMap::new(),
            weights: BTreeMap::new(),
            nmodels: 10,
        };
        let population = generator(1).generate(&run, &req).unwrap();
        assert!(population.is_empty());
    }
}
