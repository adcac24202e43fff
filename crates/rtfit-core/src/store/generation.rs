//! One generation on disk.
//!
//! A generation owns a directory holding its info file, its three tables,
//! the GA state snapshot taken at finalization and one subdirectory per
//! simulation. Appends serialize under the generation's lock; reads are
//! lock-free.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GenerationMethod;
use crate::error::{Error, Result};
use crate::launch::record::SimulationRecord;
use crate::params::ParameterVector;
use crate::store::tables::{ChiSquaredTable, IndividualsTable, ParametersTable};
use crate::units::Unit;

/// Lifecycle of a generation.
///
/// `aborted` (no simulation was accepted) and `empty` (the generator
/// produced zero non-recurrent individuals) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Planned,
    Submitted,
    PartiallyRetrieved,
    Scored,
    Finalized,
    Aborted,
    Empty,
}

impl GenerationStatus {
    fn rank(self) -> u8 {
        use GenerationStatus::*;
        match self {
            Planned => 0,
            Submitted => 1,
            PartiallyRetrieved => 2,
            Scored => 3,
            Finalized | Aborted | Empty => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        use GenerationStatus::*;
        matches!(self, Finalized | Aborted | Empty)
    }
}

/// Metadata of one generation; `info.json` in the generation directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub name: String,
    pub index: Option<u32>,
    pub method: GenerationMethod,
    pub wavelength_grid_level: u32,
    pub representation: String,
    pub npackages: u64,
    pub selfabsorption: bool,
    pub transient_heating: bool,
    pub nsimulations: usize,
    pub creation_time: DateTime<Utc>,
    pub finishing_time: Option<DateTime<Utc>>,
    pub status: GenerationStatus,
}

/// Handle to one generation directory.
#[derive(Debug)]
pub struct Generation {
    info: GenerationInfo,
    path: PathBuf,
    lock: Mutex<()>,
}

impl Generation {
    /// Create the directory layout and empty tables for a new generation.
    pub fn create(
        generations_dir: &Path,
        info: GenerationInfo,
        labels: Vec<(String, Unit)>,
    ) -> Result<Self> {
        let path = generations_dir.join(&info.name);
        std::fs::create_dir_all(path.join("simulations"))?;
        IndividualsTable::create(path.join("individuals.dat"))?;
        ParametersTable::create(path.join("parameters.dat"), labels)?;
        ChiSquaredTable::create(path.join("chi_squared.dat"))?;
        let generation = Generation {
            info,
            path,
            lock: Mutex::new(()),
        };
        generation.save_info()?;
        Ok(generation)
    }

    pub fn open(generations_dir: &Path, name: &str) -> Result<Self> {
        let path = generations_dir.join(name);
        let content = std::fs::read_to_string(path.join("info.json"))?;
        let info: GenerationInfo = serde_json::from_str(&content)?;
        Ok(Generation {
            info,
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn info(&self) -> &GenerationInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finalized(&self) -> bool {
        self.info.finishing_time.is_some()
    }

    // ---- table access -----------------------------------------------------

    pub fn individuals_table(&self) -> Result<IndividualsTable> {
        IndividualsTable::open(self.path.join("individuals.dat"))
    }

    pub fn parameters_table(&self) -> Result<ParametersTable> {
        ParametersTable::open(self.path.join("parameters.dat"))
    }

    pub fn chi_squared_table(&self) -> Result<ChiSquaredTable> {
        ChiSquaredTable::open(self.path.join("chi_squared.dat"))
    }

    fn check_mutable(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::Configuration(format!(
                "generation '{}' is finalized and read-only",
                self.info.name
            )));
        }
        Ok(())
    }

    pub fn append_individual(&self, simulation_name: &str, individual_name: &str) -> Result<()> {
        self.check_mutable()?;
        let _guard = self.lock.lock().unwrap();
        self.individuals_table()?.append(simulation_name, individual_name)
    }

    pub fn append_parameters(&self, simulation_name: &str, values: &ParameterVector) -> Result<()> {
        self.check_mutable()?;
        let _guard = self.lock.lock().unwrap();
        self.parameters_table()?.append(simulation_name, values)
    }

    pub fn append_chi_squared(&self, simulation_name: &str, chi_squared: f64) -> Result<()> {
        self.check_mutable()?;
        let _guard = self.lock.lock().unwrap();
        self.chi_squared_table()?.append(simulation_name, chi_squared)
    }

    // ---- simulations ------------------------------------------------------

    pub fn simulation_dir(&self, simulation_name: &str) -> PathBuf {
        self.path.join("simulations").join(simulation_name)
    }

    pub fn save_record(&self, record: &SimulationRecord) -> Result<()> {
        let dir = self.simulation_dir(&record.simulation_name);
        std::fs::create_dir_all(&dir)?;
        record.save(&dir)
    }

    /// Load every persisted simulation record of this generation.
    pub fn simulation_records(&self) -> Result<Vec<SimulationRecord>> {
        let simulations = self.path.join("simulations");
        let mut records = Vec::new();
        if !simulations.exists() {
            return Ok(records);
        }
        for entry in std::fs::read_dir(simulations)? {
            let entry = entry?;
            if entry.path().join("record.json").exists() {
                records.push(SimulationRecord::load(&entry.path())?);
            }
        }
        records.sort_by(|a, b| a.submission_time.cmp(&b.submission_time));
        Ok(records)
    }

    // ---- state ------------------------------------------------------------

    /// Paths of the GA state snapshot stored with this generation.
    pub fn engine_path(&self) -> PathBuf {
        self.path.join("engine.json")
    }

    pub fn prng_path(&self) -> PathBuf {
        self.path.join("prng.json")
    }

    pub fn optimizer_path(&self) -> PathBuf {
        self.path.join("optimizer.json")
    }

    pub fn save_info(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.info)?;
        std::fs::write(self.path.join("info.json"), json)?;
        Ok(())
    }

    /// Move the generation forward; regressions are rejected silently.
    pub fn advance_status(&mut self, status: GenerationStatus) -> Result<()> {
        if status.rank() <= self.info.status.rank() || self.info.status.is_terminal() {
            return Ok(());
        }
        self.info.status = status;
        self.save_info()
    }

    /// Set the finishing time; the generation is read-only afterwards.
    pub fn finalize(&mut self, status: GenerationStatus, time: DateTime<Utc>) -> Result<()> {
        debug_assert!(status.is_terminal());
        self.info.status = status;
        self.info.finishing_time = Some(time);
        self.save_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Quantity;

    fn info(name: &str) -> GenerationInfo {
        GenerationInfo {
            name: name.to_string(),
            index: None,
            method: GenerationMethod::Grid,
            wavelength_grid_level: 0,
            representation: "initial".to_string(),
            npackages: 100_000,
            selfabsorption: false,
            transient_heating: false,
            nsimulations: 4,
            creation_time: Utc::now(),
            finishing_time: None,
            status: GenerationStatus::Planned,
        }
    }

    #[test]
    fn test_create_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let generation = Generation::create(
            dir.path(),
            info("grid_2017"),
            vec![("dust_mass".to_string(), Unit::SolarMass)],
        )
        .unwrap();
        generation.append_individual("sim_a", "individual_0000").unwrap();
        let mut values = ParameterVector::new();
        values.push("dust_mass", Quantity::new(2e7, Unit::SolarMass));
        generation.append_parameters("sim_a", &values).unwrap();

        let reopened = Generation::open(dir.path(), "grid_2017").unwrap();
        assert_eq!(reopened.info().npackages, 100_000);
        assert_eq!(
            reopened.individuals_table().unwrap().simulation_names().unwrap(),
            vec!["sim_a"]
        );
    }

    #[test]
    fn test_finalized_generation_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut generation = Generation::create(dir.path(), info("grid_2017"), vec![]).unwrap();
        generation
            .finalize(GenerationStatus::Finalized, Utc::now())
            .unwrap();
        assert!(generation.append_individual("sim_b", "individual_0001").is_err());
        assert!(generation.append_chi_squared("sim_b", 1.0).is_err());
    }

    #[test]
    fn test_status_never_regresses() {
        let dir = tempfile::tempdir().unwrap();
        let mut generation = Generation::create(dir.path(), info("grid_2017"), vec![]).unwrap();
        generation.advance_status(GenerationStatus::Submitted).unwrap();
        generation.advance_status(GenerationStatus::Scored).unwrap();
        generation.advance_status(GenerationStatus::Submitted).unwrap();
        assert_eq!(generation.info().status, GenerationStatus::Scored);
    }
}
