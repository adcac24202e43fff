//! The parallelization planner.
//!
//! Given the resource demands of a scene and the layout of a host, the
//! planner picks a process/thread decomposition that fits in memory and,
//! where the wavelength count allows it, enables data parallelization.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};
use crate::hosts::{ClusterSpec, LocalSystem};
use crate::parallel::memory::MemoryEstimate;
use crate::parallel::scheme::Parallelization;
use crate::units::Quantity;

/// Cores beyond which pure multithreading stops scaling.
const MAX_THREADING_CORES: u32 = 12;

/// Wavelengths required per process for data parallelization to pay off.
const WAVELENGTHS_PER_PROCESS: u64 = 10;

/// What the scene demands from the host.
#[derive(Debug, Clone, Copy)]
pub struct SceneResources {
    pub memory: MemoryEstimate,
    pub nwavelengths: u64,
    /// Dust library dimension, 1–3; data parallelization needs 3.
    pub dustlib_dimension: u8,
}

/// What the host offers.
#[derive(Debug, Clone, Copy)]
pub struct HostResources {
    pub nodes: u32,
    pub sockets_per_node: u32,
    pub cores_per_socket: u32,
    pub memory_per_node: Quantity,
    pub mpi: bool,
    pub hyperthreading: bool,
    pub threads_per_core: u32,
}

impl HostResources {
    pub fn from_cluster(cluster: &ClusterSpec, nodes: u32, mpi: bool) -> Self {
        HostResources {
            nodes: nodes.min(cluster.nodes).max(1),
            sockets_per_node: cluster.sockets_per_node,
            cores_per_socket: cluster.cores_per_socket,
            memory_per_node: cluster.memory_per_node,
            mpi,
            hyperthreading: cluster.hyperthreading,
            threads_per_core: cluster.threads_per_core,
        }
    }

    pub fn from_local(system: &LocalSystem) -> Self {
        HostResources {
            nodes: 1,
            sockets_per_node: 1,
            cores_per_socket: system.cores,
            memory_per_node: system.memory,
            mpi: system.mpi,
            hyperthreading: system.hyperthreading(),
            threads_per_core: system.threads_per_core,
        }
    }

    fn cores_per_node(&self) -> u32 {
        self.sockets_per_node * self.cores_per_socket
    }

    fn total_cores(&self) -> u32 {
        self.nodes * self.cores_per_node()
    }

    fn threads_per_core_used(&self) -> u32 {
        if self.hyperthreading {
            self.threads_per_core
        } else {
            1
        }
    }
}

/// Chooses a parallelization scheme for (scene, host) pairs.
///
/// Deterministic modulo the divisor pick in the memory-starved multi-node
/// branch, which draws from the planner's own seeded RNG.
#[derive(Debug)]
pub struct Planner {
    rng: ChaCha8Rng,
}

impl Planner {
    pub fn new(seed: u64) -> Self {
        Planner {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn plan(&mut self, scene: &SceneResources, host: &HostResources) -> Result<Parallelization> {
        if !host.mpi {
            return Ok(self.plan_threads(host));
        }

        let total_memory = scene.memory.total_bytes();
        let node_memory = host.memory_per_node.in_base();

        if total_memory <= node_memory {
            Ok(self.plan_hybrid_fitting(scene, host, total_memory, node_memory))
        } else {
            self.plan_hybrid_starved(scene, host, node_memory)
        }
    }

    /// No MPI: one process over at most twelve cores.
    fn plan_threads(&self, host: &HostResources) -> Parallelization {
        let cores = host.cores_per_node().min(MAX_THREADING_CORES);
        Parallelization::threads(cores, host.threads_per_core_used())
    }

    /// One copy of the simulation fits on a node: pack as many processes per
    /// node as memory allows, give each an equal share of the cores.
    fn plan_hybrid_fitting(
        &self,
        scene: &SceneResources,
        host: &HostResources,
        total_memory: f64,
        node_memory: f64,
    ) -> Parallelization {
        let cores_per_node = host.cores_per_node();
        let by_memory = (node_memory / total_memory).floor() as u32;
        let processes_per_node = by_memory.min(cores_per_node).max(1);
        let processes = processes_per_node * host.nodes;

        let cores_per_process = cores_per_node / processes_per_node;
        let threads_per_core = host.threads_per_core_used();
        let threads_per_process = threads_per_core * cores_per_process;
        let total_cores = processes * cores_per_process;

        let data_parallel = scene.nwavelengths >= WAVELENGTHS_PER_PROCESS * processes as u64
            && scene.dustlib_dimension == 3;

        Parallelization::hybrid(total_cores, threads_per_core, threads_per_process, data_parallel)
    }

    /// The simulation exceeds a node's memory: split the parallel part over
    /// all nodes and use every core. The threads-per-process choice is a
    /// random divisor of the cores-per-socket count, re-drawn while the
    /// wavelength count is too small for the resulting process count.
    fn plan_hybrid_starved(
        &mut self,
        scene: &SceneResources,
        host: &HostResources,
        node_memory: f64,
    ) -> Result<Parallelization> {
        let memory_per_process =
            scene.memory.serial.in_base() + scene.memory.parallel.in_base() / host.nodes as f64;

        if host.nodes <= 1 || memory_per_process > node_memory {
            return Err(Error::InsufficientMemory {
                required: Quantity::bytes(memory_per_process),
                available: host.memory_per_node,
            });
        }

        let divisors = divisors_of(host.cores_per_socket);
        let threads_per_core = host.threads_per_core_used();
        let total_cores = host.total_cores();
        let max_tries = divisors.len() * 4;

        let mut cores_per_process = divisors[self.rng.gen_range(0..divisors.len())];
        for _ in 0..max_tries {
            let processes = total_cores / cores_per_process;
            if scene.nwavelengths >= WAVELENGTHS_PER_PROCESS * processes as u64 {
                return Ok(Parallelization::hybrid(
                    total_cores,
                    threads_per_core,
                    threads_per_core * cores_per_process,
                    true,
                ));
            }
            cores_per_process = divisors[self.rng.gen_range(0..divisors.len())];
        }

        // Too few wavelengths for any drawn process count: task-parallel.
        Ok(Parallelization::hybrid(
            total_cores,
            threads_per_core,
            threads_per_core * cores_per_process,
            false,
        ))
    }
}

/// All divisors of `n`, ascending.
fn divisors_of(n: u32) -> Vec<u32> {
    let mut divisors = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            divisors.push(i);
            if i != n / i {
                divisors.push(n / i);
            }
        }
        i += 1;
    }
    divisors.sort_unstable();
    divisors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(serial_gib: f64, parallel_gib: f64, nwavelengths: u64, dim: u8) -> SceneResources {
        SceneResources {
            memory: MemoryEstimate::new(
                Quantity::gibibytes(serial_gib),
                Quantity::gibibytes(parallel_gib),
            ),
            nwavelengths,
            dustlib_dimension: dim,
        }
    }

    fn host(nodes: u32, sockets: u32, cores: u32, memory_gib: f64, mpi: bool) -> HostResources {
        HostResources {
            nodes,
            sockets_per_node: sockets,
            cores_per_socket: cores,
            memory_per_node: Quantity::gibibytes(memory_gib),
            mpi,
            hyperthreading: false,
            threads_per_core: 1,
        }
    }

    #[test]
    fn test_divisors() {
        assert_eq!(divisors_of(12), vec![1, 2, 3, 4, 6, 12]);
        assert_eq!(divisors_of(7), vec![1, 7]);
    }

    #[test]
    fn test_no_mpi_caps_at_twelve_cores() {
        let mut planner = Planner::new(0);
        let p = planner
            .plan(&scene(1.0, 1.0, 100, 3), &host(1, 2, 16, 64.0, false))
            .unwrap();
        assert_eq!(p.cores, 12);
        assert_eq!(p.processes(), 1);
        assert!(!p.data_parallel);
    }

    #[test]
    fn test_scheduler_host_with_walltime_scenario() {
        // S=2, C=12, Mn=64 GiB, serial 10 GiB + parallel 40 GiB, L=200.
        let mut planner = Planner::new(0);
        let p = planner
            .plan(&scene(10.0, 40.0, 200, 3), &host(1, 2, 12, 64.0, true))
            .unwrap();
        assert_eq!(p.processes(), 1);
        assert_eq!(p.threads_per_process, 24);
        assert_eq!(p.cores, 24);
        assert!(p.data_parallel);
    }

    #[test]
    fn test_insufficient_memory_single_node() {
        let mut planner = Planner::new(0);
        let result = planner.plan(&scene(10.0, 200.0, 200, 3), &host(1, 2, 12, 64.0, true));
        assert!(matches!(result, Err(Error::InsufficientMemory { .. })));
    }

    #[test]
    fn test_insufficient_memory_per_process() {
        // Even spread over 2 nodes: 10 + 200/2 = 110 GiB per process > 64 GiB.
        let mut planner = Planner::new(0);
        let result = planner.plan(&scene(10.0, 200.0, 2000, 3), &host(2, 2, 12, 64.0, true));
        assert!(matches!(result, Err(Error::InsufficientMemory { .. })));
    }

    #[test]
    fn test_starved_multi_node_goes_data_parallel() {
        // 10 + 100/4 = 35 GiB per process fits in 64 GiB; plenty of
        // wavelengths, so any divisor pick accepts data parallelization.
        let mut planner = Planner::new(7);
        let p = planner
            .plan(&scene(10.0, 100.0, 100_000, 3), &host(4, 2, 12, 64.0, true))
            .unwrap();
        assert_eq!(p.cores, 96);
        assert!(p.data_parallel);
        assert_eq!(p.processes() * p.threads_per_process / p.threads_per_core, p.cores);
        assert!(p.cores <= 96);
    }

    #[test]
    fn test_starved_few_wavelengths_falls_back_to_task_parallel() {
        // One wavelength can never satisfy L >= 10 * processes.
        let mut planner = Planner::new(3);
        let p = planner
            .plan(&scene(10.0, 100.0, 1, 3), &host(4, 2, 12, 64.0, true))
            .unwrap();
        assert!(!p.data_parallel);
        assert_eq!(p.cores, 96);
    }

    #[test]
    fn test_few_wavelengths_disable_data_parallel() {
        // Fitting case: 8 processes but only 20 wavelengths.
        let mut planner = Planner::new(0);
        let p = planner
            .plan(&scene(1.0, 1.0, 20, 3), &host(2, 2, 2, 64.0, true))
            .unwrap();
        assert!(p.processes() > 1);
        assert!(!p.data_parallel);
    }

    #[test]
    fn test_data_parallel_needs_3d_dustlib() {
        let mut planner = Planner::new(0);
        let p = planner
            .plan(&scene(10.0, 40.0, 200, 1), &host(1, 2, 12, 64.0, true))
            .unwrap();
        assert!(!p.data_parallel);
    }

    #[test]
    fn test_planner_invariant_holds_across_seeds() {
        for seed in 0..32 {
            let mut planner = Planner::new(seed);
            let h = host(4, 2, 12, 64.0, true);
            let p = planner.plan(&scene(10.0, 100.0, 500, 3), &h).unwrap();
            assert_eq!(
                p.processes() * p.threads_per_process / p.threads_per_core,
                p.cores,
                "seed {seed}"
            );
            assert!(p.cores <= h.total_cores());
            assert!(p.processes() >= 1);
        }
    }
}
