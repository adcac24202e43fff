//! PBS job script generation for scheduler hosts.

use crate::launch::options::SchedulingOptions;

/// `HH:MM:SS` form of a wall time in seconds, rounded up to a full minute.
pub fn walltime_string(seconds: f64) -> String {
    let total = (seconds.max(0.0) / 60.0).ceil() as u64 * 60;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// A job script running the given simulation commands sequentially.
///
/// The caller is responsible for sizing the requested wall time: grouped
/// jobs request the sum of the per-simulation estimates times a safety
/// factor.
pub fn job_script(
    job_name: &str,
    options: &SchedulingOptions,
    walltime_seconds: f64,
    commands: &[String],
) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/sh\n");
    script.push_str(&format!("#PBS -N {job_name}\n"));
    script.push_str(&format!("#PBS -o {job_name}.out\n"));
    script.push_str(&format!("#PBS -e {job_name}.err\n"));
    script.push_str(&format!(
        "#PBS -l walltime={}\n",
        walltime_string(walltime_seconds)
    ));
    script.push_str(&format!(
        "#PBS -l nodes={}:ppn={}\n",
        options.nodes, options.ppn
    ));
    if options.mail {
        script.push_str("#PBS -m abe\n");
    }
    script.push('\n');
    for command in commands {
        script.push_str(command);
        script.push('\n');
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walltime_formatting() {
        assert_eq!(walltime_string(0.0), "00:00:00");
        assert_eq!(walltime_string(59.0), "00:01:00");
        assert_eq!(walltime_string(3600.0), "01:00:00");
        assert_eq!(walltime_string(3661.0), "01:02:00");
        assert_eq!(walltime_string(86400.0), "24:00:00");
    }

    #[test]
    fn test_script_layout() {
        let options = SchedulingOptions::new(3600.0, 2, 24);
        let script = job_script(
            "m81_gen2_0",
            &options,
            7200.0,
            &["cd /scratch/sim_a && mpirun -np 4 skirt sim_a.ski".to_string()],
        );
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("#PBS -l walltime=02:00:00"));
        assert!(script.contains("#PBS -l nodes=2:ppn=24"));
        assert!(script.contains("mpirun -np 4 skirt sim_a.ski"));
        assert!(!script.contains("#PBS -m"));
    }
}
