//! PBS batch scheduler adapter.
//!
//! Jobs submit with `qsub`, report through a single `qstat` call per sweep
//! and die with `qdel`. A job the scheduler no longer lists counts as
//! finished; whether it actually produced its artifacts is decided during
//! retrieval.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::launch::record::SimulationStatus;
use crate::remote::shell::{shell_quote, RemoteShell};

/// Scheduler operations over one host's shell session.
pub struct SchedulerClient<'a> {
    shell: &'a dyn RemoteShell,
}

impl<'a> SchedulerClient<'a> {
    pub fn new(shell: &'a dyn RemoteShell) -> Self {
        SchedulerClient { shell }
    }

    /// Submit a job script already present on the host; returns the job id.
    pub fn submit(&self, workdir: &str, script_name: &str, deadline: Duration) -> Result<String> {
        let command = format!(
            "cd {} && qsub {}",
            shell_quote(workdir),
            shell_quote(script_name)
        );
        let output = self.shell.run_command(&command, deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: self.shell.host_id().to_string(),
                message: format!("qsub failed: {}", output.stderr.trim()),
            });
        }
        let job_id = output.stdout.trim().to_string();
        if job_id.is_empty() {
            return Err(Error::RemoteTransient {
                host: self.shell.host_id().to_string(),
                message: "qsub produced no job id".to_string(),
            });
        }
        Ok(job_id)
    }

    /// Fetch the state of all given jobs in one call.
    ///
    /// Jobs absent from the listing are reported as `Finished`.
    pub fn statuses(
        &self,
        job_ids: &[String],
        deadline: Duration,
    ) -> Result<HashMap<String, SimulationStatus>> {
        let output = self.shell.run_command("qstat", deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: self.shell.host_id().to_string(),
                message: format!("qstat failed: {}", output.stderr.trim()),
            });
        }
        let listed = parse_qstat(&output.stdout);
        Ok(job_ids
            .iter()
            .map(|id| {
                let status = listed
                    .get(short_id(id))
                    .copied()
                    .unwrap_or(SimulationStatus::Finished);
                (id.clone(), status)
            })
            .collect())
    }

    /// Kill a running job.
    pub fn kill_job(&self, job_id: &str, deadline: Duration) -> Result<()> {
        self.qdel(job_id, deadline)
    }

    /// Remove a queued job before it starts.
    pub fn stop_job(&self, job_id: &str, deadline: Duration) -> Result<()> {
        self.qdel(job_id, deadline)
    }

    fn qdel(&self, job_id: &str, deadline: Duration) -> Result<()> {
        let output = self
            .shell
            .run_command(&format!("qdel {}", shell_quote(job_id)), deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: self.shell.host_id().to_string(),
                message: format!("qdel {job_id} failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }
}

/// The job id up to the first dot; `qstat` truncates the server suffix.
fn short_id(job_id: &str) -> &str {
    job_id.split('.').next().unwrap_or(job_id)
}

/// Parse the tabular `qstat` listing into job-id -> status.
fn parse_qstat(listing: &str) -> HashMap<&str, SimulationStatus> {
    let mut statuses = HashMap::new();
    for line in listing.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }
        let id = short_id(fields[0]);
        if id.chars().next().map(|c| c.is_ascii_digit()) != Some(true) {
            continue;
        }
        let status = match fields[fields.len() - 2] {
            "Q" | "H" | "W" | "T" => SimulationStatus::Queued,
            "R" | "E" => SimulationStatus::Running,
            "C" => SimulationStatus::Finished,
            _ => continue,
        };
        statuses.insert(id, status);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Job ID           Name             User     Time Use S Queue
---------------- ---------------- -------- -------- - -----
1840761.master   m81_gen2_0       obs      12:30:01 R long
1840762.master   m81_gen2_1       obs      00:00:00 Q long
1840763.master   m81_gen2_2       obs      03:10:44 C long
";

    #[test]
    fn test_parse_qstat() {
        let statuses = parse_qstat(LISTING);
        assert_eq!(statuses["1840761"], SimulationStatus::Running);
        assert_eq!(statuses["1840762"], SimulationStatus::Queued);
        assert_eq!(statuses["1840763"], SimulationStatus::Finished);
        assert_eq!(statuses.len(), 3);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("1840761.master.cluster"), "1840761");
        assert_eq!(short_id("1840761"), "1840761");
    }
}
