//! The batch simulation launcher.
//!
//! Converts a population plus an adjusted scene template into submitted
//! simulations: materialized scene files, queued records, and a submission
//! to the local worker pool, a remote shell, or a remote batch scheduler.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;

use crate::config::LauncherConfig;
use crate::error::{Error, Result};
use crate::hosts::HostSpec;
use crate::launch::input::SimulationInput;
use crate::launch::jobscript;
use crate::launch::options::SchedulingOptions;
use crate::launch::record::{SimulationRecord, SimulationStatus};
use crate::parallel::Parallelization;
use crate::params::ParameterVector;
use crate::remote::scheduler::SchedulerClient;
use crate::remote::shell::{shell_quote, RemoteShell};
use crate::scene::SceneTemplate;
use crate::store::Generation;

/// What happened to the queue.
#[derive(Debug, Default)]
pub struct LaunchSummary {
    /// Simulations accepted for execution (including ones that later crash)
    pub launched: Vec<String>,
    /// Submission failures: (simulation name, diagnostic)
    pub failed: Vec<(String, String)>,
    /// Measured wall seconds of locally executed simulations
    pub local_walls: HashMap<String, f64>,
}

/// Queues simulations and dispatches them to their execution targets.
pub struct BatchLauncher<'a> {
    config: &'a LauncherConfig,
    /// Read-only scene snapshot for this generation
    scene: &'a SceneTemplate,
    input: &'a SimulationInput,
    records: Vec<SimulationRecord>,
    parallelization_local: Option<Parallelization>,
    parallelization_hosts: HashMap<String, Parallelization>,
    scheduling_hosts: HashMap<String, SchedulingOptions>,
    dry: bool,
    group: bool,
}

impl<'a> BatchLauncher<'a> {
    pub fn new(config: &'a LauncherConfig, scene: &'a SceneTemplate, input: &'a SimulationInput) -> Self {
        BatchLauncher {
            config,
            scene,
            input,
            records: Vec::new(),
            parallelization_local: None,
            parallelization_hosts: HashMap::new(),
            scheduling_hosts: HashMap::new(),
            dry: false,
            group: false,
        }
    }

    pub fn set_dry(&mut self, dry: bool) {
        self.dry = dry;
    }

    pub fn set_group(&mut self, group: bool) {
        self.group = group;
    }

    pub fn set_parallelization_local(&mut self, parallelization: Parallelization) {
        self.parallelization_local = Some(parallelization);
    }

    pub fn set_parallelization_for_host(&mut self, host_id: &str, parallelization: Parallelization) {
        self.parallelization_hosts.insert(host_id.to_string(), parallelization);
    }

    pub fn set_scheduling_options(&mut self, host_id: &str, options: SchedulingOptions) {
        self.scheduling_hosts.insert(host_id.to_string(), options);
    }

    /// Enqueue one simulation with `status = pending`.
    pub fn add_to_queue(
        &mut self,
        generation: &Generation,
        simulation_name: &str,
        individual_name: &str,
        parameters: ParameterVector,
    ) {
        let sim_dir = generation.simulation_dir(simulation_name);
        let record = SimulationRecord::new(
            simulation_name,
            individual_name,
            generation.name(),
            parameters,
            sim_dir.join(format!("{simulation_name}.ski")),
            sim_dir.join("out"),
        );
        self.records.push(record);
    }

    pub fn queue_len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[SimulationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SimulationRecord> {
        self.records
    }

    /// Materialize, assign and submit the whole queue.
    ///
    /// `hosts` decides the targets: empty means local execution through the
    /// bounded worker pool, otherwise simulations spread round-robin over
    /// the given hosts. Dry mode stops just before every submit.
    pub fn launch(
        &mut self,
        generation: &Generation,
        run_name: &str,
        hosts: &[&HostSpec],
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        deadline: Duration,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<LaunchSummary> {
        let mut summary = LaunchSummary::default();

        self.materialize(generation)?;
        self.assign_hosts(hosts);

        if self.dry {
            let now = Utc::now();
            for record in &mut self.records {
                record.advance(SimulationStatus::Dry, now);
                generation.save_record(record)?;
                summary.launched.push(record.simulation_name.clone());
            }
            tracing::info!(count = summary.launched.len(), "dry run: submissions skipped");
            return Ok(summary);
        }

        self.run_local(generation, &mut summary, progress)?;

        for host in hosts {
            let shell = shells.get(&host.id).ok_or_else(|| {
                Error::Configuration(format!("no shell session for host '{}'", host.id))
            })?;
            let result = if host.scheduler {
                self.submit_scheduler(generation, run_name, host, shell.as_ref(), deadline, &mut summary)
            } else {
                self.submit_direct(generation, run_name, host, shell.as_ref(), deadline, &mut summary)
            };
            if let Err(e) = result {
                // The whole host failed: every still-pending simulation of
                // this host counts as a submission failure.
                tracing::error!(host = %host.id, error = %e, "submission to host failed");
                let now = Utc::now();
                for record in self.records_for_host_mut(&host.id) {
                    if record.status == SimulationStatus::Pending {
                        record.advance(SimulationStatus::Aborted, now);
                        generation.save_record(record)?;
                        summary
                            .failed
                            .push((record.simulation_name.clone(), e.to_string()));
                    }
                }
            }
        }

        Ok(summary)
    }

    // ---- preparation ------------------------------------------------------

    /// Write the concrete scene file and output directory per simulation,
    /// and stage the shared input directory of the generation.
    fn materialize(&mut self, generation: &Generation) -> Result<()> {
        self.input.check()?;
        let input_dir = generation.path().join("input");
        std::fs::create_dir_all(&input_dir)?;
        for (name, path) in self.input.iter() {
            let staged = input_dir.join(name);
            if !staged.exists() {
                std::fs::copy(path, &staged)?;
            }
        }

        for record in &self.records {
            std::fs::create_dir_all(&record.output_path)?;
            let concrete = self.scene.substitute_labels(&record.parameter_values)?;
            std::fs::write(&record.ski_path, concrete)?;
            generation.save_record(record)?;
        }
        Ok(())
    }

    fn assign_hosts(&mut self, hosts: &[&HostSpec]) {
        if hosts.is_empty() {
            return;
        }
        for (i, record) in self.records.iter_mut().enumerate() {
            record.host_id = Some(hosts[i % hosts.len()].id.clone());
        }
    }

    fn records_for_host_mut(&mut self, host_id: &str) -> impl Iterator<Item = &mut SimulationRecord> {
        let id = host_id.to_string();
        self.records
            .iter_mut()
            .filter(move |r| r.host_id.as_deref() == Some(id.as_str()))
    }

    fn shared_input_dir(&self, generation: &Generation) -> std::path::PathBuf {
        generation.path().join("input")
    }

    /// Simulator invocation for one simulation, as argv.
    fn simulator_argv(
        &self,
        parallelization: &Parallelization,
        ski: &str,
        output: &str,
        input: Option<&str>,
    ) -> Vec<String> {
        let mut argv = Vec::new();
        if parallelization.processes() > 1 {
            argv.push(self.config.simulator.mpirun.display().to_string());
            argv.push("-np".to_string());
            argv.push(parallelization.processes().to_string());
        }
        argv.push(self.config.simulator.executable.display().to_string());
        argv.extend(self.config.simulator.extra_args.iter().cloned());
        argv.push("-t".to_string());
        argv.push(parallelization.threads_per_process.to_string());
        if parallelization.data_parallel {
            argv.push("-d".to_string());
        }
        if let Some(input) = input {
            argv.push("-i".to_string());
            argv.push(input.to_string());
        }
        argv.push("-o".to_string());
        argv.push(output.to_string());
        argv.push(ski.to_string());
        argv
    }

    // ---- local execution --------------------------------------------------

    /// Run every unassigned simulation through the bounded local pool. Each
    /// worker blocks on one external simulator process.
    fn run_local(
        &mut self,
        generation: &Generation,
        summary: &mut LaunchSummary,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<()> {
        let total = self.records.iter().filter(|r| r.host_id.is_none()).count();
        if total == 0 {
            return Ok(());
        }
        let parallelization = self
            .parallelization_local
            .ok_or_else(|| Error::Configuration("no local parallelization scheme set".to_string()))?;

        let mut builder = rayon::ThreadPoolBuilder::new();
        if self.config.max_local_jobs > 0 {
            builder = builder.num_threads(self.config.max_local_jobs);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build worker pool: {e}")))?;

        let input_dir = self.shared_input_dir(generation);
        let completed = AtomicUsize::new(0);
        let config = self.config;
        let walls: Vec<(String, Option<f64>)> = pool.install(|| {
            self.records
                .par_iter_mut()
                .filter(|record| record.host_id.is_none())
                .map(|record| {
                    let wall = run_one_local(config, generation, record, &parallelization, &input_dir);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = progress {
                        callback(done, total);
                    }
                    (record.simulation_name.clone(), wall)
                })
                .collect()
        });

        for (name, wall) in walls {
            summary.launched.push(name.clone());
            if let Some(wall) = wall {
                summary.local_walls.insert(name, wall);
            }
        }
        Ok(())
    }

    // ---- direct remote execution ------------------------------------------

    /// Upload inputs and start the simulator detached on a plain shell host.
    fn submit_direct(
        &mut self,
        generation: &Generation,
        run_name: &str,
        host: &HostSpec,
        shell: &dyn RemoteShell,
        deadline: Duration,
        summary: &mut LaunchSummary,
    ) -> Result<()> {
        let parallelization = self.parallelization_for(host)?;
        let remote_gen = self.remote_generation_dir(run_name, generation);
        self.stage_remote_input(generation, shell, &remote_gen, deadline)?;

        let names: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.host_id.as_deref() == Some(host.id.as_str()))
            .map(|r| r.simulation_name.clone())
            .collect();
        for name in names {
            let outcome = self.submit_one_direct(
                generation,
                &name,
                &remote_gen,
                &parallelization,
                shell,
                deadline,
            );
            match outcome {
                Ok(()) => summary.launched.push(name),
                Err(e) => {
                    tracing::warn!(simulation = %name, error = %e, "direct submission failed");
                    let record = self
                        .records
                        .iter_mut()
                        .find(|r| r.simulation_name == name)
                        .expect("record exists");
                    record.advance(SimulationStatus::Aborted, Utc::now());
                    generation.save_record(record)?;
                    summary.failed.push((name, e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn submit_one_direct(
        &mut self,
        generation: &Generation,
        simulation_name: &str,
        remote_gen: &str,
        parallelization: &Parallelization,
        shell: &dyn RemoteShell,
        deadline: Duration,
    ) -> Result<()> {
        let remote_dir = format!("{remote_gen}/{simulation_name}");
        let remote_ski = format!("{remote_dir}/{simulation_name}.ski");
        let local_ski = generation
            .simulation_dir(simulation_name)
            .join(format!("{simulation_name}.ski"));
        let argv = self.simulator_argv(
            parallelization,
            &format!("{simulation_name}.ski"),
            "out",
            Some("../input"),
        );

        let mkdir = format!("mkdir -p {}/out", shell_quote(&remote_dir));
        let output = shell.run_command(&mkdir, deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: shell.host_id().to_string(),
                message: format!("mkdir failed: {}", output.stderr.trim()),
            });
        }
        shell.put(&local_ski, &remote_ski, deadline)?;

        let start = format!(
            "cd {dir} && rm -f .rtfit_exit && touch .rtfit_running && \
             nohup sh -c '{cmd} > console.log 2>&1; echo $? > .rtfit_exit' >/dev/null 2>&1 &",
            dir = shell_quote(&remote_dir),
            cmd = argv.join(" "),
        );
        let output = shell.run_command(&start, deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: shell.host_id().to_string(),
                message: format!("start failed: {}", output.stderr.trim()),
            });
        }

        let record = self
            .records
            .iter_mut()
            .find(|r| r.simulation_name == simulation_name)
            .expect("record exists");
        record.remote_path = Some(remote_dir);
        record.submission_time = Some(Utc::now());
        record.advance(SimulationStatus::Queued, Utc::now());
        generation.save_record(record)?;
        Ok(())
    }

    // ---- scheduler submission ---------------------------------------------

    /// Write job scripts (grouped when requested), upload everything, and
    /// `qsub` each job.
    fn submit_scheduler(
        &mut self,
        generation: &Generation,
        run_name: &str,
        host: &HostSpec,
        shell: &dyn RemoteShell,
        deadline: Duration,
        summary: &mut LaunchSummary,
    ) -> Result<()> {
        let parallelization = self.parallelization_for(host)?;
        let scheduling = self
            .scheduling_hosts
            .get(&host.id)
            .cloned()
            .unwrap_or_else(|| {
                SchedulingOptions::new(self.config.default_walltime, 1, parallelization.cores)
            });
        let remote_gen = self.remote_generation_dir(run_name, generation);
        self.stage_remote_input(generation, shell, &remote_gen, deadline)?;

        let names: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.host_id.as_deref() == Some(host.id.as_str()))
            .map(|r| r.simulation_name.clone())
            .collect();

        // Upload per-simulation directories first.
        for name in &names {
            let record = self
                .records
                .iter_mut()
                .find(|r| r.simulation_name == *name)
                .expect("record exists");
            let remote_dir = format!("{remote_gen}/{name}");
            let mkdir = format!("mkdir -p {}/out", shell_quote(&remote_dir));
            let output = shell.run_command(&mkdir, deadline)?;
            if !output.success() {
                return Err(Error::RemoteTransient {
                    host: shell.host_id().to_string(),
                    message: format!("mkdir failed: {}", output.stderr.trim()),
                });
            }
            shell.put(&record.ski_path, &format!("{remote_dir}/{name}.ski"), deadline)?;
            record.remote_path = Some(remote_dir);
        }

        // Pack simulations into jobs: one each, or as many as fit the
        // preferred group wall time.
        let per_simulation = scheduling.walltime_seconds.max(1.0);
        let group_size = if self.group {
            ((self.config.group_walltime / per_simulation).floor() as usize).max(1)
        } else {
            1
        };

        let scheduler = SchedulerClient::new(shell);
        for (job_index, chunk) in names.chunks(group_size).enumerate() {
            let job_name = format!("{run_name}_{}_{job_index}", generation.name());
            let commands: Vec<String> = chunk
                .iter()
                .map(|name| {
                    let remote_dir = format!("{remote_gen}/{name}");
                    let argv = self.simulator_argv(
                        &parallelization,
                        &format!("{name}.ski"),
                        "out",
                        Some("../input"),
                    );
                    format!(
                        "cd {dir} && touch .rtfit_running && {cmd} > console.log 2>&1; echo $? > {dir}/.rtfit_exit",
                        dir = shell_quote(&remote_dir),
                        cmd = argv.join(" "),
                    )
                })
                .collect();
            let job_walltime =
                per_simulation * chunk.len() as f64 * self.config.group_walltime_factor;
            let script = jobscript::job_script(&job_name, &scheduling, job_walltime, &commands);

            let script_path = generation.path().join(format!("{job_name}.sh"));
            std::fs::write(&script_path, &script)?;
            shell.put(&script_path, &format!("{remote_gen}/{job_name}.sh"), deadline)?;

            let job_id = scheduler.submit(&remote_gen, &format!("{job_name}.sh"), deadline)?;
            tracing::debug!(job = %job_id, simulations = chunk.len(), "job submitted");

            let now = Utc::now();
            for name in chunk {
                let record = self
                    .records
                    .iter_mut()
                    .find(|r| r.simulation_name == *name)
                    .expect("record exists");
                record.job_id = Some(job_id.clone());
                record.submission_time = Some(now);
                record.advance(SimulationStatus::Queued, now);
                generation.save_record(record)?;
                summary.launched.push(name.clone());
            }
        }
        Ok(())
    }

    // ---- shared remote helpers --------------------------------------------

    fn parallelization_for(&self, host: &HostSpec) -> Result<Parallelization> {
        self.parallelization_hosts
            .get(&host.id)
            .copied()
            .ok_or_else(|| {
                Error::Configuration(format!("no parallelization scheme for host '{}'", host.id))
            })
    }

    fn remote_generation_dir(&self, run_name: &str, generation: &Generation) -> String {
        format!(
            "{}/{}/{}",
            self.config.remote_workdir.trim_end_matches('/'),
            run_name,
            generation.name()
        )
    }

    /// Upload the generation's shared input directory once per host.
    fn stage_remote_input(
        &self,
        generation: &Generation,
        shell: &dyn RemoteShell,
        remote_gen: &str,
        deadline: Duration,
    ) -> Result<()> {
        let remote_input = format!("{remote_gen}/input");
        let output = shell.run_command(&format!("mkdir -p {}", shell_quote(&remote_input)), deadline)?;
        if !output.success() {
            return Err(Error::RemoteTransient {
                host: shell.host_id().to_string(),
                message: format!("mkdir failed: {}", output.stderr.trim()),
            });
        }
        let input_dir = self.shared_input_dir(generation);
        for (name, _) in self.input.iter() {
            shell.put(&input_dir.join(name), &format!("{remote_input}/{name}"), deadline)?;
        }
        Ok(())
    }
}

/// Execute one simulation locally; returns the measured wall seconds on
/// success. Failures become terminal record states, never errors.
fn run_one_local(
    config: &LauncherConfig,
    generation: &Generation,
    record: &mut SimulationRecord,
    parallelization: &Parallelization,
    input_dir: &Path,
) -> Option<f64> {
    record.submission_time = Some(Utc::now());
    record.advance(SimulationStatus::Queued, Utc::now());
    let _ = generation.save_record(record);

    let mut argv = Vec::new();
    if parallelization.processes() > 1 {
        argv.push(config.simulator.mpirun.display().to_string());
        argv.push("-np".to_string());
        argv.push(parallelization.processes().to_string());
    }
    argv.push(config.simulator.executable.display().to_string());
    argv.extend(config.simulator.extra_args.iter().cloned());
    argv.push("-t".to_string());
    argv.push(parallelization.threads_per_process.to_string());
    if parallelization.data_parallel {
        argv.push("-d".to_string());
    }
    argv.push("-i".to_string());
    argv.push(input_dir.display().to_string());
    argv.push("-o".to_string());
    argv.push(record.output_path.display().to_string());
    argv.push(record.ski_path.display().to_string());

    record.advance(SimulationStatus::Running, Utc::now());
    let _ = generation.save_record(record);
    tracing::debug!(simulation = %record.simulation_name, command = %argv.join(" "), "starting local simulation");

    let started = Instant::now();
    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let wall = started.elapsed().as_secs_f64();

    let ok = matches!(status, Ok(s) if s.success());
    let manifest = record
        .output_path
        .join(format!("{}_log.txt", record.simulation_name));
    if ok && manifest.exists() {
        let now = Utc::now();
        record.advance(SimulationStatus::Finished, now);
        // Local artifacts are already in place.
        record.advance(SimulationStatus::Retrieved, now);
        let _ = generation.save_record(record);
        Some(wall)
    } else {
        tracing::warn!(
            simulation = %record.simulation_name,
            exit_ok = ok,
            manifest = manifest.exists(),
            "local simulation crashed"
        );
        record.advance(SimulationStatus::Crashed, Utc::now());
        let _ = generation.save_record(record);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::config::GenerationMethod;
    use crate::store::generation::{GenerationInfo, GenerationStatus};
    use crate::units::Quantity;

    const SKI: &str = r#"<Sim numPackages="1000"><Dust mass="[mass:1]"/></Sim>"#;

    /// A stand-in simulator: writes the expected log artifact, or exits
    /// non-zero when the scene carries a mass of 666.
    fn fake_simulator(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("fake-skirt.sh");
        let script = r#"#!/bin/sh
ski=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -i|-t|-np) shift 2 ;;
    -d) shift ;;
    *) ski="$1"; shift ;;
  esac
done
if grep -q 'mass="666"' "$ski"; then exit 1; fi
base=$(basename "$ski" .ski)
echo simulation done > "$out/${base}_log.txt"
echo "0.5" > "$out/${base}_sed.dat"
"#;
        std::fs::write(&path, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn generation(dir: &Path) -> Generation {
        Generation::create(
            dir,
            GenerationInfo {
                name: "grid_test".to_string(),
                index: None,
                method: GenerationMethod::Grid,
                wavelength_grid_level: 0,
                representation: "initial".to_string(),
                npackages: 1000,
                selfabsorption: false,
                transient_heating: false,
                nsimulations: 0,
                creation_time: Utc::now(),
                finishing_time: None,
                status: GenerationStatus::Planned,
            },
            vec![],
        )
        .unwrap()
    }

    fn launcher_config(dir: &Path) -> LauncherConfig {
        LauncherConfig {
            max_local_jobs: 2,
            simulator: SimulatorConfig {
                executable: fake_simulator(dir),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn vector(mass: f64) -> ParameterVector {
        let mut v = ParameterVector::new();
        v.push("mass", Quantity::dimensionless(mass));
        v
    }

    #[test]
    fn test_local_launch_success_and_crash() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let config = launcher_config(dir.path());
        let scene = SceneTemplate::from_text(SKI);
        let input = SimulationInput::new();

        let mut launcher = BatchLauncher::new(&config, &scene, &input);
        launcher.set_parallelization_local(Parallelization::threads(1, 1));
        launcher.add_to_queue(&generation, "sim_good", "individual_0000", vector(1.0));
        launcher.add_to_queue(&generation, "sim_bad", "individual_0001", vector(666.0));

        let shells = HashMap::new();
        let summary = launcher
            .launch(&generation, "test", &[], &shells, Duration::from_secs(5), None)
            .unwrap();
        assert_eq!(summary.launched.len(), 2);
        assert!(summary.local_walls.contains_key("sim_good"));
        assert!(!summary.local_walls.contains_key("sim_bad"));

        let records = launcher.into_records();
        let good = records.iter().find(|r| r.simulation_name == "sim_good").unwrap();
        let bad = records.iter().find(|r| r.simulation_name == "sim_bad").unwrap();
        assert_eq!(good.status, SimulationStatus::Retrieved);
        assert_eq!(bad.status, SimulationStatus::Crashed);
        assert!(good.output_path.join("sim_good_log.txt").exists());
    }

    #[test]
    fn test_dry_run_stops_before_submit() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let config = launcher_config(dir.path());
        let scene = SceneTemplate::from_text(SKI);
        let input = SimulationInput::new();

        let mut launcher = BatchLauncher::new(&config, &scene, &input);
        launcher.set_dry(true);
        launcher.set_parallelization_local(Parallelization::threads(1, 1));
        launcher.add_to_queue(&generation, "sim_dry", "individual_0000", vector(2.0));

        let shells = HashMap::new();
        let summary = launcher
            .launch(&generation, "test", &[], &shells, Duration::from_secs(5), None)
            .unwrap();
        assert_eq!(summary.launched, vec!["sim_dry"]);

        let record = &launcher.records()[0];
        assert_eq!(record.status, SimulationStatus::Dry);
        // The scene file was materialized with the substituted value.
        let ski = std::fs::read_to_string(&record.ski_path).unwrap();
        assert!(ski.contains(r#"mass="2""#));
        // But nothing ran.
        assert!(!record.output_path.join("sim_dry_log.txt").exists());
    }

    #[test]
    fn test_missing_local_parallelization_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let generation = generation(dir.path());
        let config = launcher_config(dir.path());
        let scene = SceneTemplate::from_text(SKI);
        let input = SimulationInput::new();

        let mut launcher = BatchLauncher::new(&config, &scene, &input);
        launcher.add_to_queue(&generation, "sim_a", "individual_0000", vector(1.0));
        let shells = HashMap::new();
        let result = launcher.launch(&generation, "test", &[], &shells, Duration::from_secs(5), None);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
