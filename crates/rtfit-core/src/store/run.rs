//! The fitting run: the directory owning all generations and the main GA
//! state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GenerationMethod;
use crate::error::{Error, Result};
use crate::params::{ParameterVector, Range, Scale};
use crate::scene::DustGridSpec;
use crate::store::generation::{Generation, GenerationInfo};
use crate::store::tables::{GenerationRecord, GenerationsTable, MemoryTable, TimingTable};
use crate::units::{Quantity, Unit};

pub const INITIAL_GENERATION: &str = "initial";

/// One free parameter of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeParameter {
    pub label: String,
    pub unit: Unit,
    pub first_guess: Quantity,
    pub default_range: Range,
    #[serde(default)]
    pub scale: Scale,
}

/// A spatial discretization the run can simulate at.
///
/// Representations are declared in order of increasing spatial resolution;
/// `refine_spatial` advances to the next one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepresentationSpec {
    pub name: String,
    pub dust_grid: DustGridSpec,
    /// Cell count of this discretization, when known up front
    #[serde(default)]
    pub ncells: Option<u64>,
}

/// User-authored run definition, `run.json` in the run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefinition {
    pub name: String,
    /// Name of the modeled object, used in simulation prefixes
    pub object_name: String,
    /// Labeled ski template, relative to the run directory
    pub ski_template: String,
    pub free_parameters: Vec<FreeParameter>,
    /// Shared input directory, relative to the run directory
    pub input_dir: String,
    /// Input map files within the input directory
    #[serde(default)]
    pub input_maps: Vec<String>,
    /// Wavelength grid file per level (index = level), within the input dir
    pub wavelength_grids: Vec<String>,
    /// Representations in order of increasing spatial resolution
    pub representations: Vec<RepresentationSpec>,
}

/// A scored model drawn from the run's history.
#[derive(Debug, Clone)]
pub struct EvaluatedModel {
    pub simulation_name: String,
    pub generation_name: String,
    pub parameters: ParameterVector,
    pub chi_squared: Option<f64>,
}

/// Exclusive lock over a fitting run, held for destructive operations.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(run_path: &Path) -> Result<Self> {
        let path = run_path.join(".lock");
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(RunLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::Configuration(format!(
                    "fitting run is locked by another process ({})",
                    path.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Handle to a fitting run directory.
#[derive(Debug)]
pub struct FittingRun {
    path: PathBuf,
    definition: RunDefinition,
}

impl FittingRun {
    /// Open an existing run.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path.join("run.json"))?;
        let definition: RunDefinition = serde_json::from_str(&content)?;
        if definition.free_parameters.is_empty() {
            return Err(Error::Configuration(format!(
                "run '{}' declares no free parameters",
                definition.name
            )));
        }
        if definition.representations.is_empty() {
            return Err(Error::Configuration(format!(
                "run '{}' declares no representations",
                definition.name
            )));
        }
        Ok(FittingRun {
            path: path.to_path_buf(),
            definition,
        })
    }

    /// Create the directory layout for a new run.
    pub fn create(path: &Path, definition: RunDefinition) -> Result<Self> {
        std::fs::create_dir_all(path.join("generations"))?;
        let json = serde_json::to_string_pretty(&definition)?;
        std::fs::write(path.join("run.json"), json)?;
        GenerationsTable::create(path.join("generations.dat"))?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &RunDefinition {
        &self.definition
    }

    // ---- paths ------------------------------------------------------------

    pub fn generations_dir(&self) -> PathBuf {
        self.path.join("generations")
    }

    pub fn input_dir(&self) -> PathBuf {
        self.path.join(&self.definition.input_dir)
    }

    pub fn ski_template_path(&self) -> PathBuf {
        self.path.join(&self.definition.ski_template)
    }

    pub fn hosts_path(&self) -> PathBuf {
        self.path.join("hosts.json")
    }

    pub fn main_engine_path(&self) -> PathBuf {
        self.path.join("main_engine.json")
    }

    pub fn main_prng_path(&self) -> PathBuf {
        self.path.join("main_prng.json")
    }

    pub fn optimizer_config_path(&self) -> PathBuf {
        self.path.join("optimizer.json")
    }

    // ---- tables -----------------------------------------------------------

    pub fn generations_table(&self) -> Result<GenerationsTable> {
        GenerationsTable::open_or_create(self.path.join("generations.dat"))
    }

    pub fn timing_table(&self) -> Result<TimingTable> {
        TimingTable::open_or_create(self.path.join("timing.dat"))
    }

    pub fn memory_table(&self) -> Result<MemoryTable> {
        MemoryTable::open_or_create(self.path.join("memory.dat"))
    }

    // ---- free parameters --------------------------------------------------

    pub fn free_parameter_labels(&self) -> Vec<String> {
        self.definition
            .free_parameters
            .iter()
            .map(|p| p.label.clone())
            .collect()
    }

    pub fn parameter_units(&self) -> Vec<(String, Unit)> {
        self.definition
            .free_parameters
            .iter()
            .map(|p| (p.label.clone(), p.unit))
            .collect()
    }

    pub fn free_parameter(&self, label: &str) -> Result<&FreeParameter> {
        self.definition
            .free_parameters
            .iter()
            .find(|p| p.label == label)
            .ok_or_else(|| Error::Configuration(format!("unknown free parameter '{label}'")))
    }

    // ---- generations ------------------------------------------------------

    pub fn generation_names(&self) -> Result<Vec<String>> {
        self.generations_table()?.generation_names()
    }

    pub fn ngenerations(&self) -> Result<usize> {
        Ok(self.generation_names()?.len())
    }

    pub fn generation(&self, name: &str) -> Result<Generation> {
        Generation::open(&self.generations_dir(), name)
    }

    pub fn create_generation(
        &self,
        info: GenerationInfo,
        ranges: &std::collections::BTreeMap<String, Range>,
        scales: &std::collections::BTreeMap<String, Scale>,
    ) -> Result<Generation> {
        let record = GenerationRecord {
            name: info.name.clone(),
            index: info.index,
            method: info.method,
            wavelength_grid_level: info.wavelength_grid_level,
            representation: info.representation.clone(),
            nsimulations: info.nsimulations,
            npackages: info.npackages,
            self_absorption: info.selfabsorption,
            transient_heating: info.transient_heating,
            creation_time: info.creation_time,
            finishing_time: None,
            ranges: ranges.clone(),
            scales: scales.clone(),
        };
        self.generations_table()?.append(&record)?;
        Generation::create(&self.generations_dir(), info, self.parameter_units())
    }

    /// The most recently created generation, if any.
    pub fn last_generation_record(&self) -> Result<Option<GenerationRecord>> {
        Ok(self.generations_table()?.records()?.into_iter().last())
    }

    pub fn has_initial_genetic_generation(&self) -> Result<bool> {
        Ok(self
            .generation_names()?
            .iter()
            .any(|name| name == INITIAL_GENERATION))
    }

    /// Highest index among genetic generations, ignoring the unindexed
    /// initial one.
    pub fn last_genetic_generation_index(&self) -> Result<Option<u32>> {
        Ok(self
            .generations_table()?
            .records()?
            .iter()
            .filter(|r| r.method == GenerationMethod::Genetic)
            .filter_map(|r| r.index)
            .max())
    }

    pub fn genetic_generation_name(index: u32) -> String {
        format!("Generation{index}")
    }

    /// Timestamped name for a grid generation.
    pub fn grid_generation_name(time: &DateTime<Utc>) -> String {
        format!("grid_{}", time.format("%Y-%m-%d--%H-%M-%S-%3f"))
    }

    // ---- history ----------------------------------------------------------

    /// Every evaluated model across all generations, with its χ² when the
    /// generation has one.
    pub fn evaluated_models(&self) -> Result<Vec<EvaluatedModel>> {
        let mut models = Vec::new();
        for name in self.generation_names()? {
            let generation = match self.generation(&name) {
                Ok(g) => g,
                // A row may outlive its directory mid-restart; skip.
                Err(_) => continue,
            };
            let scores: std::collections::HashMap<String, f64> = generation
                .chi_squared_table()?
                .rows()?
                .into_iter()
                .collect();
            for (simulation_name, parameters) in generation.parameters_table()?.rows()? {
                let chi_squared = scores.get(&simulation_name).copied();
                models.push(EvaluatedModel {
                    simulation_name,
                    generation_name: name.clone(),
                    parameters,
                    chi_squared,
                });
            }
        }
        Ok(models)
    }

    pub fn has_evaluated_models(&self) -> Result<bool> {
        Ok(self
            .evaluated_models()?
            .iter()
            .any(|m| m.chi_squared.is_some()))
    }

    /// The evaluated model with the lowest χ².
    pub fn best_model(&self) -> Result<Option<EvaluatedModel>> {
        Ok(self
            .evaluated_models()?
            .into_iter()
            .filter(|m| m.chi_squared.is_some())
            .min_by(|a, b| {
                a.chi_squared
                    .partial_cmp(&b.chi_squared)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }))
    }

    // ---- main GA state ----------------------------------------------------

    /// Write a main-state file atomically (temp sibling + rename).
    pub fn write_state_file(&self, path: &Path, content: &str) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // ---- restart ----------------------------------------------------------

    /// Remove `from` and every later generation, rewinding the main GA state
    /// to the latest surviving genetic generation.
    ///
    /// The removal closure is computed up front; nothing is touched until
    /// the confirmation predicate accepts the full list. Runs under the
    /// exclusive run lock.
    pub fn restart_from<F>(&self, from: &str, confirm: F) -> Result<Vec<String>>
    where
        F: FnOnce(&[String]) -> bool,
    {
        let _lock = RunLock::acquire(&self.path)?;

        let table = self.generations_table()?;
        let records = table.records()?;
        let position = records
            .iter()
            .position(|r| r.name == from)
            .ok_or_else(|| Error::Configuration(format!("generation '{from}' does not exist")))?;

        let to_clear: Vec<String> = records[position..].iter().map(|r| r.name.clone()).collect();
        let survivors = &records[..position];

        if !confirm(&to_clear) {
            return Err(Error::RestartConfirmationRequired(from.to_string()));
        }

        let removes_genetic = records[position..]
            .iter()
            .any(|r| r.method == GenerationMethod::Genetic);
        let last_surviving_genetic = survivors
            .iter()
            .rev()
            .find(|r| r.method == GenerationMethod::Genetic)
            .map(|r| r.name.clone());

        // Rewind the main GA state before anything disappears.
        if removes_genetic {
            match last_surviving_genetic {
                Some(name) => {
                    let generation = self.generation(&name)?;
                    replace_file(&generation.engine_path(), &self.main_engine_path())?;
                    replace_file(&generation.prng_path(), &self.main_prng_path())?;
                    replace_file(&generation.optimizer_path(), &self.optimizer_config_path())?;
                }
                None => {
                    remove_if_exists(&self.main_engine_path())?;
                    remove_if_exists(&self.main_prng_path())?;
                    remove_if_exists(&self.optimizer_config_path())?;
                }
            }
        }

        table.remove_entries(&to_clear)?;
        for name in &to_clear {
            let dir = self.generations_dir().join(name);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }

        tracing::info!(from = %from, removed = to_clear.len(), "restarted fitting run");
        Ok(to_clear)
    }

    /// Acquire the exclusive run lock for the duration of a run.
    pub fn lock(&self) -> Result<RunLock> {
        RunLock::acquire(&self.path)
    }
}

fn replace_file(source: &Path, target: &Path) -> Result<()> {
    let content = std::fs::read(source)?;
    let tmp = target.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
