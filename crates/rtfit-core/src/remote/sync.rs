//! The remote synchronizer.
//!
//! Polls every used host with one batched status call per sweep, advances
//! simulation records through the status machine, retrieves artifacts of
//! finished simulations, feeds them to the analyser and cleans up remote
//! working directories. Cross-host sweeps run in parallel; calls to one host
//! serialize on its session.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rayon::prelude::*;

use crate::analyse::Analyser;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::hosts::HostSpec;
use crate::launch::record::{SimulationRecord, SimulationStatus};
use crate::remote::scheduler::SchedulerClient;
use crate::remote::shell::{shell_quote, RemoteShell};
use crate::store::Generation;

/// Which simulations a `sync` invocation acts on.
#[derive(Debug, Clone, Default)]
pub struct SyncSelection {
    /// Per-host list of simulation indices (submission order on that host)
    pub ids: BTreeMap<String, Vec<usize>>,
    /// Simulations in any of these states are selected on every host
    pub statuses: Vec<SimulationStatus>,
}

impl SyncSelection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.statuses.is_empty()
    }

    fn matches(&self, host_id: &str, index: usize, status: SimulationStatus) -> bool {
        if self.statuses.contains(&status) {
            return true;
        }
        self.ids
            .get(host_id)
            .map(|indices| indices.contains(&index))
            .unwrap_or(false)
    }
}

/// Per-host status counts and the simulations needing attention.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub status_counts: BTreeMap<String, BTreeMap<&'static str, usize>>,
    pub attention: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncSummary {
    fn count(&mut self, host: &str, status: SimulationStatus) {
        *self
            .status_counts
            .entry(host.to_string())
            .or_default()
            .entry(status.as_str())
            .or_insert(0) += 1;
    }

    /// Render the per-host table printed after each generation.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (host, counts) in &self.status_counts {
            out.push_str(&format!("{host}:"));
            for (status, count) in counts {
                out.push_str(&format!(" {status}={count}"));
            }
            out.push('\n');
        }
        if !self.attention.is_empty() {
            out.push_str(&format!("needs attention: {}\n", self.attention.join(", ")));
        }
        out
    }
}

/// One observed transition, applied to the master records after the
/// parallel host sweeps complete.
#[derive(Debug)]
struct Update {
    simulation_name: String,
    status: SimulationStatus,
}

/// Drives simulations from `queued` to a terminal state.
pub struct RemoteSynchronizer<'a> {
    config: &'a SyncConfig,
    keep_remote_output: bool,
}

impl<'a> RemoteSynchronizer<'a> {
    pub fn new(config: &'a SyncConfig, keep_remote_output: bool) -> Self {
        RemoteSynchronizer {
            config,
            keep_remote_output,
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs_f64(self.config.deadline)
    }

    /// Poll until every record is terminal or the cancel flag is raised.
    ///
    /// A cancel stops polling promptly; in-flight transfers finish or time
    /// out individually, and already-submitted remote simulations stay
    /// submitted for reconciliation on the next run.
    pub fn synchronize(
        &self,
        generation: &Generation,
        records: &mut Vec<SimulationRecord>,
        hosts: &HashMap<String, HostSpec>,
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        analyser: &dyn Analyser,
        cancel: &AtomicBool,
    ) -> Result<SyncSummary> {
        let mut failures: HashMap<String, u32> = HashMap::new();
        let mut interval = self.config.poll_interval;
        loop {
            let summary = self.sweep(generation, records, hosts, shells, analyser)?;

            let unfinished = records.iter().filter(|r| !r.status.is_terminal()).count();
            if unfinished == 0 || cancel.load(Ordering::SeqCst) {
                return Ok(summary);
            }

            // Back off while hosts report transient errors; give up on a
            // host after the configured retry budget.
            if summary.errors.is_empty() {
                interval = self.config.poll_interval;
                failures.clear();
            } else {
                interval = (interval * self.config.backoff_factor).min(self.config.max_poll_interval);
                for error in &summary.errors {
                    tracing::warn!(error = %error, "transient synchronization error");
                }
                for host_id in hosts.keys() {
                    if summary.errors.iter().any(|e| e.contains(host_id.as_str())) {
                        let count = failures.entry(host_id.clone()).or_insert(0);
                        *count += 1;
                        if *count > self.config.max_retries {
                            self.abort_host(generation, records, host_id)?;
                        }
                    }
                }
            }

            // Sleep in short steps so a cancel terminates polling promptly.
            let mut remaining = interval;
            while remaining > 0.0 && !cancel.load(Ordering::SeqCst) {
                let step = remaining.min(0.2);
                std::thread::sleep(Duration::from_secs_f64(step));
                remaining -= step;
            }
        }
    }

    /// Exhausted retries: every non-terminal simulation of the host aborts.
    fn abort_host(
        &self,
        generation: &Generation,
        records: &mut [SimulationRecord],
        host_id: &str,
    ) -> Result<()> {
        let now = Utc::now();
        for record in records
            .iter_mut()
            .filter(|r| r.host_id.as_deref() == Some(host_id) && !r.status.is_terminal())
        {
            tracing::error!(
                simulation = %record.simulation_name,
                host = %host_id,
                "aborting after repeated transient failures"
            );
            record.advance(SimulationStatus::Aborted, now);
            generation.save_record(record)?;
        }
        Ok(())
    }

    /// One synchronization pass over all hosts.
    pub fn sweep(
        &self,
        generation: &Generation,
        records: &mut Vec<SimulationRecord>,
        hosts: &HashMap<String, HostSpec>,
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        analyser: &dyn Analyser,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        // Group non-terminal remote records per host.
        let mut by_host: BTreeMap<String, Vec<SimulationRecord>> = BTreeMap::new();
        for record in records.iter() {
            if let Some(host_id) = &record.host_id {
                if !record.status.is_terminal() {
                    by_host
                        .entry(host_id.clone())
                        .or_default()
                        .push(record.clone());
                }
            }
        }

        // Parallel fetch across hosts; per-host calls serialize on the
        // host's single session.
        let sweeps: Vec<(String, Result<Vec<Update>>)> = by_host
            .par_iter()
            .map(|(host_id, snapshot)| {
                let result = match (hosts.get(host_id), shells.get(host_id)) {
                    (Some(host), Some(shell)) => {
                        self.sweep_host(host, shell.as_ref(), snapshot)
                    }
                    _ => Err(Error::Configuration(format!(
                        "no session for host '{host_id}'"
                    ))),
                };
                (host_id.clone(), result)
            })
            .collect();

        let now = Utc::now();
        for (host_id, result) in sweeps {
            match result {
                Ok(updates) => {
                    for update in updates {
                        if let Some(record) = records
                            .iter_mut()
                            .find(|r| r.simulation_name == update.simulation_name)
                        {
                            if record.advance(update.status, now) {
                                generation.save_record(record)?;
                            }
                        }
                    }
                }
                Err(e) => summary.errors.push(format!("{host_id}: {e}")),
            }
        }

        // Analyse everything retrieved but not yet scored, local and remote.
        for record in records.iter_mut() {
            if record.status != SimulationStatus::Retrieved {
                continue;
            }
            match analyser.analyse(record, &record.output_path.clone()) {
                Ok(chi_squared) => {
                    generation.append_chi_squared(&record.simulation_name, chi_squared)?;
                    record.chi_squared = Some(chi_squared);
                    record.advance(SimulationStatus::Analyzed, Utc::now());
                    generation.save_record(record)?;
                }
                Err(e) => {
                    tracing::error!(
                        simulation = %record.simulation_name,
                        error = %e,
                        "analysis failed"
                    );
                    record.advance(SimulationStatus::Crashed, Utc::now());
                    generation.save_record(record)?;
                    summary.attention.push(record.simulation_name.clone());
                }
            }
        }

        for record in records.iter() {
            let host = record.host_id.as_deref().unwrap_or("local");
            summary.count(host, record.status);
            if record.status.is_failure() {
                summary.attention.push(record.simulation_name.clone());
            }
        }
        summary.attention.sort();
        summary.attention.dedup();
        Ok(summary)
    }

    /// Batched status fetch and retrieval for one host.
    fn sweep_host(
        &self,
        host: &HostSpec,
        shell: &dyn RemoteShell,
        snapshot: &[SimulationRecord],
    ) -> Result<Vec<Update>> {
        let mut updates = Vec::new();

        // Scheduler view first: one qstat for all job ids.
        let mut job_states: HashMap<String, SimulationStatus> = HashMap::new();
        if host.scheduler {
            let job_ids: Vec<String> = snapshot
                .iter()
                .filter_map(|r| r.job_id.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            if !job_ids.is_empty() {
                job_states = SchedulerClient::new(shell).statuses(&job_ids, self.deadline())?;
            }
        }

        // Marker probe: one remote command over every working directory.
        let dirs: Vec<&str> = snapshot
            .iter()
            .filter_map(|r| r.remote_path.as_deref())
            .collect();
        let marker_states = if dirs.is_empty() {
            HashMap::new()
        } else {
            let output = shell.run_command(&probe_command(&dirs), self.deadline())?;
            if !output.success() {
                return Err(Error::RemoteTransient {
                    host: host.id.clone(),
                    message: format!("status probe failed: {}", output.stderr.trim()),
                });
            }
            parse_probe(&output.stdout)
        };

        for record in snapshot {
            let name = record
                .remote_path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .unwrap_or(&record.simulation_name);
            let marker = marker_states.get(name).copied();
            let scheduler_state = record
                .job_id
                .as_ref()
                .and_then(|id| job_states.get(id))
                .copied();

            let observed = match marker {
                Some(ProbeState::Exited(0)) => Some(SimulationStatus::Finished),
                Some(ProbeState::Exited(_)) => Some(SimulationStatus::Crashed),
                Some(ProbeState::Running) => Some(SimulationStatus::Running),
                Some(ProbeState::Waiting) | None => scheduler_state,
            };

            match observed {
                Some(SimulationStatus::Finished) => {
                    match self.retrieve(record, shell) {
                        Ok(true) => updates.push(Update {
                            simulation_name: record.simulation_name.clone(),
                            status: SimulationStatus::Retrieved,
                        }),
                        Ok(false) => {
                            // Exit code zero but the artifact manifest is
                            // incomplete: the simulation crashed.
                            self.cleanup(record, shell);
                            updates.push(Update {
                                simulation_name: record.simulation_name.clone(),
                                status: SimulationStatus::Crashed,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(SimulationStatus::Crashed) => {
                    self.cleanup(record, shell);
                    updates.push(Update {
                        simulation_name: record.simulation_name.clone(),
                        status: SimulationStatus::Crashed,
                    });
                }
                Some(status) => updates.push(Update {
                    simulation_name: record.simulation_name.clone(),
                    status,
                }),
                None => {}
            }
        }
        Ok(updates)
    }

    /// Pull the output directory local; true when the manifest is complete.
    fn retrieve(&self, record: &SimulationRecord, shell: &dyn RemoteShell) -> Result<bool> {
        let remote_dir = record
            .remote_path
            .as_deref()
            .ok_or_else(|| Error::Configuration(format!(
                "simulation '{}' finished remotely but has no remote path",
                record.simulation_name
            )))?;
        let local_parent = record
            .output_path
            .parent()
            .ok_or_else(|| Error::Configuration("output path has no parent".to_string()))?;
        std::fs::create_dir_all(local_parent)?;
        shell.get(&format!("{remote_dir}/out"), local_parent, self.deadline())?;

        let manifest = record
            .output_path
            .join(format!("{}_log.txt", record.simulation_name));
        let complete = manifest.exists();
        if complete {
            tracing::debug!(simulation = %record.simulation_name, "artifacts retrieved");
            self.cleanup(record, shell);
        }
        Ok(complete)
    }

    /// Remove the remote working directory unless `keep` is set. Best
    /// effort: a failed removal only logs.
    fn cleanup(&self, record: &SimulationRecord, shell: &dyn RemoteShell) {
        if self.keep_remote_output {
            return;
        }
        if let Some(remote_dir) = record.remote_path.as_deref() {
            if let Err(e) = shell.remove_dir(remote_dir, self.deadline()) {
                tracing::warn!(
                    simulation = %record.simulation_name,
                    error = %e,
                    "could not remove remote working directory"
                );
            }
        }
    }

    // ---- user-flagged simulations -----------------------------------------

    /// Kill, stop or clean up the selected simulations, advancing each to
    /// `cancelled` or `aborted` depending on where the transition came from.
    pub fn apply_selection(
        &self,
        generation: &Generation,
        records: &mut [SimulationRecord],
        hosts: &HashMap<String, HostSpec>,
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        selection: &SyncSelection,
    ) -> Result<Vec<String>> {
        let mut actions = Vec::new();
        let mut host_index: HashMap<String, usize> = HashMap::new();
        let now = Utc::now();

        for record in records.iter_mut() {
            let Some(host_id) = record.host_id.clone() else {
                continue;
            };
            let index = {
                let counter = host_index.entry(host_id.clone()).or_insert(0);
                let current = *counter;
                *counter += 1;
                current
            };
            if !selection.matches(&host_id, index, record.status) {
                continue;
            }
            let Some(shell) = shells.get(&host_id) else {
                continue;
            };
            let scheduler = hosts.get(&host_id).map(|h| h.scheduler).unwrap_or(false);
            let shell = shell.as_ref();

            match record.status {
                SimulationStatus::Queued => {
                    if scheduler {
                        if let Some(job_id) = &record.job_id {
                            SchedulerClient::new(shell).stop_job(job_id, self.deadline())?;
                        }
                    } else {
                        self.kill_direct(record, shell)?;
                    }
                    self.cleanup(record, shell);
                    record.advance(SimulationStatus::Cancelled, now);
                    generation.save_record(record)?;
                    actions.push(format!("{}: cancelled", record.simulation_name));
                }
                SimulationStatus::Running => {
                    if scheduler {
                        if let Some(job_id) = &record.job_id {
                            SchedulerClient::new(shell).kill_job(job_id, self.deadline())?;
                        }
                    } else {
                        self.kill_direct(record, shell)?;
                    }
                    self.cleanup(record, shell);
                    record.advance(SimulationStatus::Aborted, now);
                    generation.save_record(record)?;
                    actions.push(format!("{}: aborted", record.simulation_name));
                }
                SimulationStatus::Finished => {
                    tracing::warn!(
                        simulation = %record.simulation_name,
                        "finished but not retrieved; removing it now would lose all output"
                    );
                }
                SimulationStatus::Crashed
                | SimulationStatus::Cancelled
                | SimulationStatus::Aborted => {
                    self.cleanup(record, shell);
                    actions.push(format!("{}: cleaned up", record.simulation_name));
                }
                _ => {}
            }
        }
        Ok(actions)
    }

    /// Terminate a directly executed simulation via its scene file name.
    fn kill_direct(&self, record: &SimulationRecord, shell: &dyn RemoteShell) -> Result<()> {
        let pattern = format!("{}.ski", record.simulation_name);
        // pkill exits 1 when nothing matched; that is fine.
        shell.run_command(&format!("pkill -f {}", shell_quote(&pattern)), self.deadline())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ProbeState {
    Waiting,
    Running,
    Exited(i32),
}

/// One command reporting the marker state of every working directory.
fn probe_command(dirs: &[&str]) -> String {
    let quoted: Vec<String> = dirs.iter().map(|d| shell_quote(d)).collect();
    format!(
        "for d in {}; do n=$(basename \"$d\"); \
         if [ -f \"$d/.rtfit_exit\" ]; then echo \"$n exit $(cat \"$d/.rtfit_exit\")\"; \
         elif [ -f \"$d/.rtfit_running\" ]; then echo \"$n running\"; \
         else echo \"$n queued\"; fi; done",
        quoted.join(" ")
    )
}

fn parse_probe(output: &str) -> HashMap<String, ProbeState> {
    let mut states = HashMap::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [name, "running"] => {
                states.insert(name.to_string(), ProbeState::Running);
            }
            [name, "queued"] => {
                states.insert(name.to_string(), ProbeState::Waiting);
            }
            [name, "exit", code] => {
                states.insert(
                    name.to_string(),
                    ProbeState::Exited(code.parse().unwrap_or(-1)),
                );
            }
            _ => {}
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationMethod;
    use crate::params::ParameterVector;
    use crate::remote::shell::CommandOutput;
    use crate::store::generation::{GenerationInfo, GenerationStatus};
    use std::path::Path;
    use std::sync::Mutex;

    /// Scripted host: remembers per-simulation state and serves the probe,
    /// transfer and removal calls the synchronizer makes.
    struct MockShell {
        host: String,
        /// simulation name -> (probe state line suffix, artifacts complete)
        outcomes: Mutex<HashMap<String, (String, bool)>>,
        removed: Mutex<Vec<String>>,
    }

    impl MockShell {
        fn new(host: &str) -> Self {
            MockShell {
                host: host.to_string(),
                outcomes: Mutex::new(HashMap::new()),
                removed: Mutex::new(Vec::new()),
            }
        }

        fn script(&self, simulation: &str, state: &str, artifacts: bool) {
            self.outcomes
                .lock()
                .unwrap()
                .insert(simulation.to_string(), (state.to_string(), artifacts));
        }
    }

    impl RemoteShell for MockShell {
        fn host_id(&self) -> &str {
            &self.host
        }

        fn connect(&self, _deadline: Duration) -> crate::error::Result<()> {
            Ok(())
        }

        fn run_command(&self, command: &str, _deadline: Duration) -> crate::error::Result<CommandOutput> {
            if command.starts_with("for d in") {
                let outcomes = self.outcomes.lock().unwrap();
                let mut stdout = String::new();
                for (name, (state, _)) in outcomes.iter() {
                    stdout.push_str(&format!("{name} {state}\n"));
                }
                return Ok(CommandOutput {
                    stdout,
                    stderr: String::new(),
                    exit_code: 0,
                });
            }
            if command.starts_with("rm -rf") {
                let dir = command.trim_start_matches("rm -rf ").to_string();
                self.removed.lock().unwrap().push(dir);
            }
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        fn put(&self, _local: &Path, _remote: &str, _deadline: Duration) -> crate::error::Result<()> {
            Ok(())
        }

        fn get(&self, remote: &str, local: &Path, _deadline: Duration) -> crate::error::Result<()> {
            // remote is "<...>/<name>/out"; recreate the artifact set locally.
            let name = remote
                .trim_end_matches("/out")
                .rsplit('/')
                .next()
                .unwrap()
                .to_string();
            let complete = self
                .outcomes
                .lock()
                .unwrap()
                .get(&name)
                .map(|(_, complete)| *complete)
                .unwrap_or(false);
            let out = local.join("out");
            std::fs::create_dir_all(&out).unwrap();
            if complete {
                std::fs::write(out.join(format!("{name}_log.txt")), "done").unwrap();
                std::fs::write(out.join(format!("{name}_sed.dat")), "0.5").unwrap();
            }
            Ok(())
        }
    }

    fn generation(dir: &Path) -> Generation {
        Generation::create(
            dir,
            GenerationInfo {
                name: "Generation1".to_string(),
                index: Some(1),
                method: GenerationMethod::Genetic,
                wavelength_grid_level: 0,
                representation: "initial".to_string(),
                npackages: 1000,
                selfabsorption: false,
                transient_heating: false,
                nsimulations: 0,
                creation_time: Utc::now(),
                finishing_time: None,
                status: GenerationStatus::Submitted,
            },
            vec![],
        )
        .unwrap()
    }

    fn remote_record(generation: &Generation, name: &str, host: &str) -> SimulationRecord {
        let sim_dir = generation.simulation_dir(name);
        let mut record = SimulationRecord::new(
            name,
            format!("individual_{name}"),
            generation.name(),
            ParameterVector::new(),
            sim_dir.join(format!("{name}.ski")),
            sim_dir.join("out"),
        );
        record.host_id = Some(host.to_string());
        record.remote_path = Some(format!("/scratch/run/Generation1/{name}"));
        record.submission_time = Some(Utc::now());
        record.advance(SimulationStatus::Queued, Utc::now());
        record
    }

    fn host_spec(id: &str) -> HostSpec {
        HostSpec {
            id: id.to_string(),
            user: "obs".to_string(),
            hostname: format!("{id}.example.org"),
            port: 22,
            scheduler: false,
            cluster_name: None,
            cluster: None,
            mpi: true,
            poll_interval: None,
        }
    }

    fn analyser() -> impl Analyser {
        |record: &SimulationRecord, output_dir: &Path| {
            let sed = output_dir.join(format!("{}_sed.dat", record.simulation_name));
            let content = std::fs::read_to_string(sed)?;
            Ok(content.trim().parse::<f64>().unwrap_or(f64::MAX))
        }
    }

    #[test]
    fn test_partial_remote_failure() {
        // 10 submissions: 7 finish, 3 crash. The χ² table gets 7 rows, the
        // crashed simulations carry status crashed and no artifacts, and no
        // record is left in a non-terminal state.
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let shell = Arc::new(MockShell::new("plain"));
        let mut records = Vec::new();
        for i in 0..10 {
            let name = format!("sim_{i:02}");
            if i < 7 {
                shell.script(&name, "exit 0", true);
            } else {
                shell.script(&name, "exit 134", false);
            }
            records.push(remote_record(&generation, &name, "plain"));
        }

        let mut hosts = HashMap::new();
        hosts.insert("plain".to_string(), host_spec("plain"));
        let mut shells: HashMap<String, Arc<dyn RemoteShell>> = HashMap::new();
        shells.insert("plain".to_string(), shell.clone());

        let config = SyncConfig {
            poll_interval: 0.01,
            ..Default::default()
        };
        let synchronizer = RemoteSynchronizer::new(&config, false);
        let cancel = AtomicBool::new(false);
        let summary = synchronizer
            .synchronize(&generation, &mut records, &hosts, &shells, &analyser(), &cancel)
            .unwrap();

        let analyzed = records
            .iter()
            .filter(|r| r.status == SimulationStatus::Analyzed)
            .count();
        let crashed = records
            .iter()
            .filter(|r| r.status == SimulationStatus::Crashed)
            .count();
        assert_eq!(analyzed, 7);
        assert_eq!(crashed, 3);
        assert_eq!(generation.chi_squared_table().unwrap().rows().unwrap().len(), 7);
        assert!(records.iter().all(|r| r.status.is_terminal()));
        assert_eq!(summary.status_counts["plain"]["analyzed"], 7);
        assert_eq!(summary.status_counts["plain"]["crashed"], 3);

        // Crashed simulations have no artifact directory content.
        for record in records.iter().filter(|r| r.status == SimulationStatus::Crashed) {
            assert!(!record
                .output_path
                .join(format!("{}_log.txt", record.simulation_name))
                .exists());
        }
        // Every remote working directory was removed.
        assert_eq!(shell.removed.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_sweep_is_idempotent_for_retrieved() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let shell = Arc::new(MockShell::new("plain"));
        shell.script("sim_00", "exit 0", true);
        let mut records = vec![remote_record(&generation, "sim_00", "plain")];

        let mut hosts = HashMap::new();
        hosts.insert("plain".to_string(), host_spec("plain"));
        let mut shells: HashMap<String, Arc<dyn RemoteShell>> = HashMap::new();
        shells.insert("plain".to_string(), shell.clone());

        let config = SyncConfig::default();
        let synchronizer = RemoteSynchronizer::new(&config, false);
        synchronizer
            .sweep(&generation, &mut records, &hosts, &shells, &analyser())
            .unwrap();
        assert_eq!(records[0].status, SimulationStatus::Analyzed);
        let chi2_rows = generation.chi_squared_table().unwrap().rows().unwrap().len();

        // A second sweep reporting `finished` again must change nothing.
        synchronizer
            .sweep(&generation, &mut records, &hosts, &shells, &analyser())
            .unwrap();
        assert_eq!(records[0].status, SimulationStatus::Analyzed);
        assert_eq!(
            generation.chi_squared_table().unwrap().rows().unwrap().len(),
            chi2_rows
        );
    }

    #[test]
    fn test_selection_kills_running_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let shell = Arc::new(MockShell::new("plain"));
        shell.script("sim_00", "running", false);
        let mut records = vec![remote_record(&generation, "sim_00", "plain")];
        records[0].advance(SimulationStatus::Running, Utc::now());

        let mut hosts = HashMap::new();
        hosts.insert("plain".to_string(), host_spec("plain"));
        let mut shells: HashMap<String, Arc<dyn RemoteShell>> = HashMap::new();
        shells.insert("plain".to_string(), shell.clone());

        let config = SyncConfig::default();
        let synchronizer = RemoteSynchronizer::new(&config, false);
        let selection = SyncSelection {
            statuses: vec![SimulationStatus::Running],
            ..Default::default()
        };
        let actions = synchronizer
            .apply_selection(&generation, &mut records, &hosts, &shells, &selection)
            .unwrap();
        assert_eq!(actions, vec!["sim_00: aborted"]);
        assert_eq!(records[0].status, SimulationStatus::Aborted);
        assert_eq!(shell.removed.lock().unwrap().len(), 1);
    }
}
