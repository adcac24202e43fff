//! Scheduling options negotiated per scheduler host.

use serde::{Deserialize, Serialize};

/// What the job script requests from the batch scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingOptions {
    /// Expected wall time of one simulation, in seconds
    pub walltime_seconds: f64,
    /// Nodes per job
    pub nodes: u32,
    /// Processors per node
    pub ppn: u32,
    /// Ask the scheduler to mail on job state changes
    #[serde(default)]
    pub mail: bool,
}

impl SchedulingOptions {
    pub fn new(walltime_seconds: f64, nodes: u32, ppn: u32) -> Self {
        SchedulingOptions {
            walltime_seconds,
            nodes,
            ppn,
            mail: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let options = SchedulingOptions::new(7200.0, 2, 24);
        let json = serde_json::to_string(&options).unwrap();
        let parsed: SchedulingOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, options);
    }
}
