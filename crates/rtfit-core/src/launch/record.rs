//! Simulation records and their status machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::ParameterVector;

/// Lifecycle state of one simulation.
///
/// ```text
/// pending -> queued -> running -> finished -> retrieved -> analyzed
///                       |          |
///                       |          +-> crashed
///                       +-> cancelled
///                       +-> aborted
/// ```
///
/// `dry` is the resting state of a dry-run submission. Transitions are
/// monotone: a record never regresses, and `finished` arriving for an
/// already-retrieved simulation is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Pending,
    Dry,
    Queued,
    Running,
    Finished,
    Retrieved,
    Analyzed,
    Crashed,
    Cancelled,
    Aborted,
}

impl SimulationStatus {
    /// Position along the success path; used to reject regressions.
    fn rank(self) -> u8 {
        use SimulationStatus::*;
        match self {
            Pending => 0,
            Queued => 1,
            Running => 2,
            Finished => 3,
            Retrieved => 4,
            Analyzed => 5,
            Dry | Crashed | Cancelled | Aborted => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        use SimulationStatus::*;
        matches!(self, Dry | Analyzed | Crashed | Cancelled | Aborted)
    }

    pub fn is_failure(self) -> bool {
        use SimulationStatus::*;
        matches!(self, Crashed | Cancelled | Aborted)
    }

    /// Whether the machine allows `self -> next` as a direct edge.
    pub fn allows(self, next: SimulationStatus) -> bool {
        use SimulationStatus::*;
        match (self, next) {
            (Pending, Dry) | (Pending, Queued) => true,
            (Queued, Running) | (Queued, Cancelled) | (Queued, Aborted) => true,
            (Running, Finished) | (Running, Crashed) | (Running, Cancelled) | (Running, Aborted) => true,
            (Finished, Retrieved) | (Finished, Crashed) => true,
            (Retrieved, Analyzed) => true,
            // Batch status reports may skip intermediate states.
            (a, b) if !a.is_terminal() && b != Dry && b.rank() > a.rank() => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        use SimulationStatus::*;
        match self {
            Pending => "pending",
            Dry => "dry",
            Queued => "queued",
            Running => "running",
            Finished => "finished",
            Retrieved => "retrieved",
            Analyzed => "analyzed",
            Crashed => "crashed",
            Cancelled => "cancelled",
            Aborted => "aborted",
        }
    }
}

impl std::str::FromStr for SimulationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        use SimulationStatus::*;
        match s {
            "pending" => Ok(Pending),
            "dry" => Ok(Dry),
            "queued" => Ok(Queued),
            "running" => Ok(Running),
            "finished" => Ok(Finished),
            "retrieved" => Ok(Retrieved),
            "analyzed" => Ok(Analyzed),
            "crashed" => Ok(Crashed),
            "cancelled" => Ok(Cancelled),
            "aborted" => Ok(Aborted),
            other => Err(format!("invalid simulation status '{other}'")),
        }
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the run remembers about one simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRecord {
    /// Unique across the fitting run
    pub simulation_name: String,
    pub individual_name: String,
    pub generation_name: String,
    pub parameter_values: ParameterVector,
    /// Executing host; `None` for local execution
    pub host_id: Option<String>,
    /// Scheduler job id, once submitted to a scheduler
    pub job_id: Option<String>,
    /// Materialized scene file
    pub ski_path: PathBuf,
    /// Local output directory
    pub output_path: PathBuf,
    /// Remote working directory, for remote execution
    pub remote_path: Option<String>,
    pub submission_time: Option<DateTime<Utc>>,
    pub status: SimulationStatus,
    pub status_time: DateTime<Utc>,
    pub retrieval_time: Option<DateTime<Utc>>,
    pub chi_squared: Option<f64>,
}

impl SimulationRecord {
    pub fn new(
        simulation_name: impl Into<String>,
        individual_name: impl Into<String>,
        generation_name: impl Into<String>,
        parameter_values: ParameterVector,
        ski_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        SimulationRecord {
            simulation_name: simulation_name.into(),
            individual_name: individual_name.into(),
            generation_name: generation_name.into(),
            parameter_values,
            host_id: None,
            job_id: None,
            ski_path,
            output_path,
            remote_path: None,
            submission_time: None,
            status: SimulationStatus::Pending,
            status_time: Utc::now(),
            retrieval_time: None,
            chi_squared: None,
        }
    }

    /// Advance the record if the transition is legal. Regressions and
    /// repeated reports of the current state are ignored; returns whether the
    /// record changed.
    pub fn advance(&mut self, status: SimulationStatus, time: DateTime<Utc>) -> bool {
        if status == self.status || !self.status.allows(status) {
            return false;
        }
        self.status = status;
        self.status_time = time;
        if status == SimulationStatus::Retrieved {
            self.retrieval_time = Some(time);
        }
        true
    }

    pub fn record_path(dir: &Path) -> PathBuf {
        dir.join("record.json")
    }

    /// Persist next to the simulation's ski file and output directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::record_path(dir), json)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(Self::record_path(dir))?;
        Ok(serde_json::from_str(&content)?)
    }
}
