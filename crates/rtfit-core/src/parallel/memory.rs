//! Memory requirements of one simulation.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scene::SceneTemplate;
use crate::units::Quantity;

const BYTES_PER_CELL_SERIAL: f64 = 160.0;
const BYTES_PER_CELL_WAVELENGTH: f64 = 8.0;
const BASE_SERIAL_BYTES: f64 = 200.0 * 1024.0 * 1024.0;

/// Split memory estimate of one simulation.
///
/// The serial part is replicated into every process; the parallel part is
/// divided over processes when data parallelization is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryEstimate {
    pub serial: Quantity,
    pub parallel: Quantity,
}

impl MemoryEstimate {
    pub fn new(serial: Quantity, parallel: Quantity) -> Self {
        MemoryEstimate { serial, parallel }
    }

    /// Total requirement of a single process holding everything.
    pub fn total_bytes(&self) -> f64 {
        self.serial.in_base() + self.parallel.in_base()
    }

    /// Rough estimate from scene properties and an optional cell count
    /// override (relevant when a file-tree dust grid hides the cell count
    /// from the scene itself).
    pub fn for_scene(scene: &SceneTemplate, ncells: Option<u64>, nwavelengths: u64) -> Result<Self> {
        let ncells = ncells.or_else(|| scene.ncells()).unwrap_or(100_000) as f64;
        let selfabsorption = scene.selfabsorption().unwrap_or(false);

        let serial = BASE_SERIAL_BYTES + ncells * BYTES_PER_CELL_SERIAL;

        // Radiation field and instrument cubes scale with cells x wavelengths;
        // self-absorption keeps a second field in memory.
        let mut parallel = ncells * nwavelengths as f64 * BYTES_PER_CELL_WAVELENGTH;
        if selfabsorption {
            parallel *= 2.0;
        }

        Ok(MemoryEstimate::new(
            Quantity::bytes(serial),
            Quantity::bytes(parallel),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let estimate = MemoryEstimate::new(Quantity::gibibytes(10.0), Quantity::gibibytes(40.0));
        let gib = 1024.0 * 1024.0 * 1024.0;
        assert_eq!(estimate.total_bytes(), 50.0 * gib);
    }

    #[test]
    fn test_selfabsorption_doubles_parallel_part() {
        let ski = r#"<Sim numPackages="1000"><PanDustSystem selfAbsorption="false" dustEmissivity="GreyBody" numCells="1000000"/><CartesianDustGrid/></Sim>"#;
        let scene = SceneTemplate::from_text(ski);
        let without = MemoryEstimate::for_scene(&scene, None, 100).unwrap();
        let mut scene2 = SceneTemplate::from_text(ski);
        scene2.set_selfabsorption(true).unwrap();
        let with = MemoryEstimate::for_scene(&scene2, None, 100).unwrap();
        assert_eq!(with.parallel.in_base(), 2.0 * without.parallel.in_base());
        assert_eq!(with.serial.in_base(), without.serial.in_base());
    }
}
