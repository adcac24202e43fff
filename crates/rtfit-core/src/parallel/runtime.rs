//! Wall-time prediction from historical timing data.

use serde::{Deserialize, Serialize};

use crate::parallel::scheme::Parallelization;

/// One row of the timing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub simulation_name: String,
    pub host: String,
    pub cluster: String,
    pub processes: u32,
    pub threads_per_process: u32,
    pub threads_per_core: u32,
    pub data_parallel: bool,
    pub packages: u64,
    pub nwavelengths: u64,
    pub wall_seconds: f64,
}

impl TimingRecord {
    /// Normalized workload of this row: packages x wavelengths per physical
    /// core, `cores = processes x threads_per_process / threads_per_core`.
    fn workload(&self) -> f64 {
        let cores = (self.processes * self.threads_per_process / self.threads_per_core.max(1)).max(1);
        self.packages as f64 * self.nwavelengths as f64 / cores as f64
    }
}

/// Predicts wall times for a (scene, parallelization, host) tuple.
///
/// Rows matching (host, cluster, data-parallel flag) are fitted linearly in
/// `packages x nwavelengths / total_cores`; with fewer than `min_samples`
/// matches the nearest matching row wins.
#[derive(Debug)]
pub struct RuntimeEstimator {
    records: Vec<TimingRecord>,
    min_samples: usize,
}

impl RuntimeEstimator {
    pub fn new(records: Vec<TimingRecord>, min_samples: usize) -> Self {
        RuntimeEstimator {
            records,
            min_samples: min_samples.max(2),
        }
    }

    /// Estimated wall time in seconds, or `None` without any matching data.
    pub fn runtime_for(
        &self,
        host: &str,
        cluster: &str,
        parallelization: &Parallelization,
        packages: u64,
        nwavelengths: u64,
    ) -> Option<f64> {
        let matching: Vec<&TimingRecord> = self
            .records
            .iter()
            .filter(|r| {
                r.host == host && r.cluster == cluster && r.data_parallel == parallelization.data_parallel
            })
            .collect();
        if matching.is_empty() {
            return None;
        }

        let workload =
            packages as f64 * nwavelengths as f64 / parallelization.cores.max(1) as f64;

        if matching.len() >= self.min_samples {
            if let Some(estimate) = linear_fit(&matching, workload) {
                return Some(estimate);
            }
        }

        // Nearest neighbour in workload space.
        matching
            .iter()
            .min_by(|a, b| {
                let da = (a.workload() - workload).abs();
                let db = (b.workload() - workload).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|r| r.wall_seconds)
    }
}

/// Least-squares `wall = a + b * workload`, evaluated at `workload`. Fails
/// when all samples share one workload value.
fn linear_fit(records: &[&TimingRecord], workload: f64) -> Option<f64> {
    let n = records.len() as f64;
    let sum_x: f64 = records.iter().map(|r| r.workload()).sum();
    let sum_y: f64 = records.iter().map(|r| r.wall_seconds).sum();
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    let sxx: f64 = records.iter().map(|r| (r.workload() - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = records
        .iter()
        .map(|r| (r.workload() - mean_x) * (r.wall_seconds - mean_y))
        .sum();

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    Some((intercept + slope * workload).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(workload_cores: (u64, u64, u32), wall: f64, data_parallel: bool) -> TimingRecord {
        let (packages, nwavelengths, cores) = workload_cores;
        TimingRecord {
            simulation_name: "sim".into(),
            host: "batch1".into(),
            cluster: "delcatty".into(),
            processes: cores,
            threads_per_process: 1,
            threads_per_core: 1,
            data_parallel,
            packages,
            nwavelengths,
            wall_seconds: wall,
        }
    }

    #[test]
    fn test_linear_fit_recovers_trend() {
        // wall = 100 + 2e-4 * workload
        let records = vec![
            record((1_000_000, 100, 10), 100.0 + 2e-4 * 1e7, false),
            record((2_000_000, 100, 10), 100.0 + 2e-4 * 2e7, false),
            record((4_000_000, 100, 10), 100.0 + 2e-4 * 4e7, false),
        ];
        let estimator = RuntimeEstimator::new(records, 3);
        let p = Parallelization::threads(10, 1);
        let estimate = estimator
            .runtime_for("batch1", "delcatty", &p, 3_000_000, 100)
            .unwrap();
        assert_relative_eq!(estimate, 100.0 + 2e-4 * 3e7, max_relative = 1e-9);
    }

    #[test]
    fn test_nearest_neighbour_fallback() {
        let records = vec![record((1_000_000, 100, 10), 500.0, false)];
        let estimator = RuntimeEstimator::new(records, 5);
        let p = Parallelization::threads(10, 1);
        let estimate = estimator
            .runtime_for("batch1", "delcatty", &p, 9_000_000, 100)
            .unwrap();
        assert_relative_eq!(estimate, 500.0);
    }

    #[test]
    fn test_data_parallel_rows_do_not_mix() {
        let records = vec![
            record((1_000_000, 100, 10), 500.0, true),
            record((1_000_000, 100, 10), 900.0, false),
        ];
        let estimator = RuntimeEstimator::new(records, 5);
        let mut p = Parallelization::threads(10, 1);
        p.data_parallel = true;
        let estimate = estimator
            .runtime_for("batch1", "delcatty", &p, 1_000_000, 100)
            .unwrap();
        assert_relative_eq!(estimate, 500.0);
    }

    #[test]
    fn test_hyperthreaded_rows_normalize_by_physical_cores() {
        // 4 processes x 12 threads at 2 threads/core = 24 physical cores;
        // the fit must see the same workload as a 24-core query.
        let mut row = record((1_000_000, 100, 4), 800.0, false);
        row.threads_per_process = 12;
        row.threads_per_core = 2;
        let estimator = RuntimeEstimator::new(vec![row], 5);
        let p = Parallelization::hybrid(24, 2, 12, false);
        let estimate = estimator
            .runtime_for("batch1", "delcatty", &p, 1_000_000, 100)
            .unwrap();
        assert_relative_eq!(estimate, 800.0);
    }

    #[test]
    fn test_no_matching_rows() {
        let estimator = RuntimeEstimator::new(vec![], 2);
        let p = Parallelization::threads(4, 1);
        assert!(estimator
            .runtime_for("batch1", "delcatty", &p, 1, 1)
            .is_none());
    }
}
