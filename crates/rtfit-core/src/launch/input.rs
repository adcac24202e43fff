//! The shared input file set of one generation.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Files every simulation of a generation reads: input maps, the wavelength
/// grid and, when a file-tree dust grid is in use, the pre-built tree file.
#[derive(Debug, Clone, Default)]
pub struct SimulationInput {
    files: Vec<(String, PathBuf)>,
}

impl SimulationInput {
    pub fn new() -> Self {
        SimulationInput { files: Vec::new() }
    }

    /// Register a file under its own file name.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Configuration(format!("input path '{}' has no file name", path.display())))?
            .to_string();
        if self.files.iter().any(|(n, _)| *n == name) {
            return Ok(());
        }
        self.files.push((name, path));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.files.iter().map(|(n, p)| (n.as_str(), p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Verify every registered file exists.
    pub fn check(&self) -> Result<()> {
        for (name, path) in &self.files {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "input file '{name}' missing at '{}'",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplicates_by_name() {
        let mut input = SimulationInput::new();
        input.add_file("/data/maps/old_stars.fits").unwrap();
        input.add_file("/elsewhere/old_stars.fits").unwrap();
        input.add_file("/data/wavelengths_level2.dat").unwrap();
        assert_eq!(input.len(), 2);
        assert!(input.contains("old_stars.fits"));
        assert!(input.contains("wavelengths_level2.dat"));
    }

    #[test]
    fn test_check_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.dat");
        std::fs::write(&present, "x").unwrap();
        let mut input = SimulationInput::new();
        input.add_file(&present).unwrap();
        assert!(input.check().is_ok());
        input.add_file(dir.path().join("absent.dat")).unwrap();
        assert!(input.check().is_err());
    }
}
