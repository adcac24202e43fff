//! Core library for radiative-transfer model fitting orchestration.
//!
//! rtfit automates large-scale fitting of radiative-transfer models: it
//! plans the CPU/MPI parallelization of an external Monte-Carlo simulator
//! per host, generates successive populations of trial parameter vectors
//! (uniform grid or genetic with recurrence detection), launches and tracks
//! the resulting simulations across local and remote hosts (directly or
//! through a batch scheduler), and scores retrieved outputs to drive the
//! next generation.
//!
//! The external simulator, the preparation of input maps and grids, and the
//! χ² computation are collaborators behind narrow seams
//! ([`config::SimulatorConfig`], read-only input paths, and the
//! [`analyse::Analyser`] trait).

pub mod analyse;
pub mod config;
pub mod error;
pub mod explorer;
pub mod generate;
pub mod hosts;
pub mod launch;
pub mod parallel;
pub mod params;
pub mod remote;
pub mod scene;
pub mod store;
pub mod units;

pub use analyse::{Analyser, CommandAnalyser};
pub use config::{
    ExplorationConfig, GenerationMethod, LauncherConfig, OptimizerConfig, RecurrenceConfig,
    SimulatorConfig, SyncConfig,
};
pub use error::{Error, Result};
pub use explorer::{GenerationOutcome, ParameterExplorer};
pub use generate::{GenerationRequest, ModelGenerator, Population};
pub use hosts::{ClusterSpec, HostSpec, Inventory, LocalSystem};
pub use launch::{BatchLauncher, SimulationInput, SimulationRecord, SimulationStatus};
pub use parallel::{MemoryEstimate, Parallelization, Planner, RuntimeEstimator};
pub use params::{Individual, ParameterVector, Range, Scale};
pub use remote::{RemoteShell, RemoteSynchronizer, SshShell, SyncSelection};
pub use scene::{DustGridSpec, SceneTemplate};
pub use store::{FittingRun, Generation, GenerationInfo, GenerationStatus, RunDefinition};
pub use units::{Quantity, Unit};
