//! The analyser seam.
//!
//! Flux extraction and χ² computation live outside the core; the
//! synchronizer hands every retrieved simulation to an [`Analyser`] and
//! writes the returned χ² into the generation's table.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::launch::record::SimulationRecord;

/// Consumes retrieved artifacts and scores the simulation.
pub trait Analyser: Send + Sync {
    /// Compute the χ² of a retrieved simulation from its local output
    /// directory.
    fn analyse(&self, record: &SimulationRecord, output_dir: &Path) -> Result<f64>;
}

impl<F> Analyser for F
where
    F: Fn(&SimulationRecord, &Path) -> Result<f64> + Send + Sync,
{
    fn analyse(&self, record: &SimulationRecord, output_dir: &Path) -> Result<f64> {
        self(record, output_dir)
    }
}

/// Runs an external analysis command with the output directory as its
/// argument and parses the χ² from its last stdout line.
#[derive(Debug, Clone)]
pub struct CommandAnalyser {
    pub command: std::path::PathBuf,
    pub args: Vec<String>,
}

impl Analyser for CommandAnalyser {
    fn analyse(&self, record: &SimulationRecord, output_dir: &Path) -> Result<f64> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(&record.simulation_name)
            .arg(output_dir)
            .output()
            .map_err(|e| {
                Error::Configuration(format!(
                    "analyser '{}' failed to start: {e}",
                    self.command.display()
                ))
            })?;
        if !output.status.success() {
            return Err(Error::SimulationCrashed(record.simulation_name.clone()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let last = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("");
        last.trim().parse().map_err(|_| {
            Error::Configuration(format!(
                "analyser printed no chi-squared value (got '{last}')"
            ))
        })
    }
}
