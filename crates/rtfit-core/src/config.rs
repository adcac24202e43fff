//! Runtime configuration for the fitting components.
//!
//! Each component takes an explicit, typed configuration struct at
//! construction. All of them can be loaded from a JSON file and overridden
//! field by field from the command line.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a new population of trial models is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Grid,
    Genetic,
}

impl GenerationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMethod::Grid => "grid",
            GenerationMethod::Genetic => "genetic",
        }
    }
}

impl std::str::FromStr for GenerationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(GenerationMethod::Grid),
            "genetic" => Ok(GenerationMethod::Genetic),
            other => Err(format!("invalid generation method '{other}'")),
        }
    }
}

/// Complete configuration for one exploration invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Name of the fitting run to explore
    pub run_name: String,
    /// Population strategy
    pub method: GenerationMethod,
    /// Number of generations to run in this invocation
    pub ngenerations: usize,
    /// Requested number of simulations per generation
    pub nsimulations: usize,
    /// Bump the wavelength grid level for the new generation
    pub refine_spectral: bool,
    /// Advance to the next (finer) spatial representation
    pub refine_spatial: bool,
    /// Scale the number of photon packages by this factor
    pub npackages_factor: Option<f64>,
    /// Override dust self-absorption for the new generation
    pub selfabsorption: Option<bool>,
    /// Override transient heating for the new generation
    pub transient_heating: Option<bool>,
    /// Remove this generation and everything after it before exploring
    pub restart_from: Option<String>,
    /// Short-circuit just before every submit
    pub dry: bool,
    /// Remote host ids to spread simulations over (empty = local only)
    pub remotes: Vec<String>,
    /// Pack multiple simulations into one scheduler job
    pub group: bool,
    /// Explicit parameter ranges (label -> "min max" pair), overriding derivation
    pub ranges: BTreeMap<String, (crate::units::Quantity, crate::units::Quantity)>,
    /// Relative spread around the best model when deriving ranges
    pub relative_spread: f64,
    /// Explicit number of grid points per label
    pub npoints: BTreeMap<String, usize>,
    /// Per-label sampling weights (grid: who gets extra resolution first)
    pub weights: BTreeMap<String, f64>,
    /// Seed for every stochastic component of this invocation
    pub seed: u64,
    /// Record wall times into the timing table
    pub record_timing: bool,
    /// Record peak memory into the memory table
    pub record_memory: bool,
    /// GA hyper-parameters
    pub optimizer: OptimizerConfig,
    /// Recurrence detection settings
    pub recurrence: RecurrenceConfig,
    /// Launcher settings
    pub launcher: LauncherConfig,
    /// Synchronizer settings
    pub sync: SyncConfig,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            run_name: String::new(),
            method: GenerationMethod::Genetic,
            ngenerations: 1,
            nsimulations: 100,
            refine_spectral: false,
            refine_spatial: false,
            npackages_factor: None,
            selfabsorption: None,
            transient_heating: None,
            restart_from: None,
            dry: false,
            remotes: Vec::new(),
            group: false,
            ranges: BTreeMap::new(),
            relative_spread: 0.3,
            npoints: BTreeMap::new(),
            weights: BTreeMap::new(),
            seed: 42,
            record_timing: true,
            record_memory: true,
            optimizer: OptimizerConfig::default(),
            recurrence: RecurrenceConfig::default(),
            launcher: LauncherConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Hyper-parameters of the genetic engine.
///
/// Persisted with the run (`optimizer.json`) so that later generations evolve
/// under the same settings that produced the current engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Probability of single-point crossover (else the first parent is cloned)
    pub crossover_rate: f64,
    /// Per-label mutation probability
    pub mutation_rate: f64,
    /// Mutation sigma as a fraction of the label's range span
    pub mutation_sigma: f64,
    /// Number of best individuals copied unchanged into the next generation
    pub elitism: usize,
    /// Tournament size for parent selection
    pub tournament_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            crossover_rate: 0.65,
            mutation_rate: 0.15,
            mutation_sigma: 0.1,
            elitism: 2,
            tournament_size: 3,
        }
    }
}

/// Per-label tolerance override for recurrence detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

/// Settings for detecting recurrent individuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrenceConfig {
    /// Compare new individuals against all previously evaluated ones
    pub check: bool,
    /// Global relative tolerance
    pub rtol: f64,
    /// Global absolute tolerance
    pub atol: f64,
    /// Per-label overrides of the global tolerances
    pub per_label: BTreeMap<String, Tolerance>,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            check: true,
            rtol: 1e-5,
            atol: 1e-8,
            per_label: BTreeMap::new(),
        }
    }
}

/// How the external simulator binary is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Path to the simulator executable
    pub executable: PathBuf,
    /// MPI launcher used when the parallelization has more than one process
    pub mpirun: PathBuf,
    /// Extra arguments appended to every invocation
    pub extra_args: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("skirt"),
            mpirun: PathBuf::from("mpirun"),
            extra_args: Vec::new(),
        }
    }
}

/// Settings for the simulation launcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Bound on concurrently running local simulations (0 = physical cores)
    pub max_local_jobs: usize,
    /// Keep remote output directories after retrieval
    pub keep_remote_output: bool,
    /// Safety factor applied to summed wall-time estimates of grouped jobs
    pub group_walltime_factor: f64,
    /// Preferred wall time of one grouped job, in seconds
    pub group_walltime: f64,
    /// Wall time assumed for a simulation with no timing history, in seconds
    pub default_walltime: f64,
    /// Simulator invocation
    pub simulator: SimulatorConfig,
    /// Remote root under which per-run working directories are created
    pub remote_workdir: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            max_local_jobs: 0,
            keep_remote_output: false,
            group_walltime_factor: 1.2,
            group_walltime: 12.0 * 3600.0,
            default_walltime: 3600.0,
            simulator: SimulatorConfig::default(),
            remote_workdir: "~/rtfit".to_string(),
        }
    }
}

/// Settings for the remote synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base poll interval per host, in seconds
    pub poll_interval: f64,
    /// Multiplier applied to the interval after a transient error
    pub backoff_factor: f64,
    /// Ceiling on the backed-off interval, in seconds
    pub max_poll_interval: f64,
    /// Deadline for a single remote operation, in seconds
    pub deadline: f64,
    /// Transient retries before a simulation is marked aborted
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: 30.0,
            backoff_factor: 2.0,
            max_poll_interval: 600.0,
            deadline: 120.0,
            max_retries: 5,
        }
    }
}

impl ExplorationConfig {
    /// Create from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Create from a JSON file.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExplorationConfig::default();
        assert_eq!(config.optimizer.tournament_size, 3);
        assert_eq!(config.recurrence.rtol, 1e-5);
        assert!(config.record_timing);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ExplorationConfig::default();
        let json = config.to_json().unwrap();
        let parsed = ExplorationConfig::from_json(&json).unwrap();
        assert_eq!(parsed.optimizer, config.optimizer);
        assert_eq!(parsed.sync.max_retries, config.sync.max_retries);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed = ExplorationConfig::from_json(r#"{"run_name": "m81", "nsimulations": 9}"#).unwrap();
        assert_eq!(parsed.run_name, "m81");
        assert_eq!(parsed.nsimulations, 9);
        assert_eq!(parsed.ngenerations, 1);
        assert!(parsed.recurrence.check);
    }
}
