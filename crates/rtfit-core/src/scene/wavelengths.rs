//! Wavelength grid files.
//!
//! The file is opaque content owned by the external tooling; the core only
//! needs its row count and its name. A leading lone-integer line is treated
//! as a declared count and validated against the actual rows.

use std::path::Path;

use crate::error::{Error, Result};

/// Count the wavelength rows of a grid file.
pub fn count_wavelengths(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Scene(format!(
            "cannot read wavelength grid '{}': {e}",
            path.display()
        ))
    })?;
    let mut rows: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if rows.is_empty() {
        return Err(Error::Scene(format!(
            "wavelength grid '{}' is empty",
            path.display()
        )));
    }

    // Optional declared count on the first line.
    if let Ok(declared) = rows[0].parse::<u64>() {
        if rows[0].split_whitespace().count() == 1 && !rows[0].contains('.') {
            rows.remove(0);
            if declared != rows.len() as u64 {
                return Err(Error::Scene(format!(
                    "wavelength grid '{}' declares {declared} rows but has {}",
                    path.display(),
                    rows.len()
                )));
            }
            return Ok(declared);
        }
    }
    Ok(rows.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_grid(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_count_plain_rows() {
        let file = write_grid("# wavelengths in micron\n0.1\n0.2\n0.35\n1.0\n");
        assert_eq!(count_wavelengths(file.path()).unwrap(), 4);
    }

    #[test]
    fn test_declared_count() {
        let file = write_grid("3\n0.1\n0.2\n0.35\n");
        assert_eq!(count_wavelengths(file.path()).unwrap(), 3);
    }

    #[test]
    fn test_declared_count_mismatch() {
        let file = write_grid("5\n0.1\n0.2\n");
        assert!(count_wavelengths(file.path()).is_err());
    }

    #[test]
    fn test_empty_grid() {
        let file = write_grid("# nothing\n");
        assert!(count_wavelengths(file.path()).is_err());
    }
}
