//! The parallelization scheme of one simulation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How one simulation spreads over cores, threads and processes.
///
/// Invariant: `processes() * threads_per_process / threads_per_core ==
/// cores`, and `processes() >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parallelization {
    /// Total physical cores in use
    pub cores: u32,
    /// Hardware threads used per core (1 without hyperthreading)
    pub threads_per_core: u32,
    /// Threads of one process
    pub threads_per_process: u32,
    /// Whether the wavelength dimension is split across processes
    pub data_parallel: bool,
}

impl Parallelization {
    /// Pure multithreading: a single process over `cores`.
    pub fn threads(cores: u32, threads_per_core: u32) -> Self {
        Parallelization {
            cores,
            threads_per_core,
            threads_per_process: cores * threads_per_core,
            data_parallel: false,
        }
    }

    /// Hybrid MPI + threads.
    pub fn hybrid(
        cores: u32,
        threads_per_core: u32,
        threads_per_process: u32,
        data_parallel: bool,
    ) -> Self {
        Parallelization {
            cores,
            threads_per_core,
            threads_per_process,
            data_parallel,
        }
    }

    /// Total hardware threads.
    pub fn nthreads(&self) -> u32 {
        self.cores * self.threads_per_core
    }

    /// Number of MPI processes.
    pub fn processes(&self) -> u32 {
        (self.nthreads() / self.threads_per_process).max(1)
    }

    /// Compact form used in job names and log lines, e.g. `4x6d` for four
    /// processes of six threads with data parallelization.
    pub fn signature(&self) -> String {
        format!(
            "{}x{}{}",
            self.processes(),
            self.threads_per_process,
            if self.data_parallel { "d" } else { "t" }
        )
    }
}

impl fmt::Display for Parallelization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores, {} processes x {} threads ({}-parallel)",
            self.cores,
            self.processes(),
            self.threads_per_process,
            if self.data_parallel { "data" } else { "task" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_mode_is_one_process() {
        let p = Parallelization::threads(12, 2);
        assert_eq!(p.processes(), 1);
        assert_eq!(p.nthreads(), 24);
        assert!(!p.data_parallel);
    }

    #[test]
    fn test_core_invariant() {
        let p = Parallelization::hybrid(24, 1, 6, true);
        assert_eq!(p.processes(), 4);
        assert_eq!(p.processes() * p.threads_per_process / p.threads_per_core, p.cores);
        assert_eq!(p.signature(), "4x6d");
    }

    #[test]
    fn test_invariant_with_hyperthreading() {
        let p = Parallelization::hybrid(24, 2, 12, false);
        assert_eq!(p.processes(), 4);
        assert_eq!(p.processes() * p.threads_per_process / p.threads_per_core, p.cores);
    }
}
