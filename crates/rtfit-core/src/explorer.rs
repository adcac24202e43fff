//! The fitting runner.
//!
//! One `ParameterExplorer` invocation sequences, per generation: resolve
//! ranges, derive the generation info, generate the population, plan
//! parallelizations, adjust the scene, persist tables, launch, synchronize,
//! score and finalize. Planner and configuration failures abort before any
//! submission; per-simulation failures surface as terminal record states.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::analyse::Analyser;
use crate::config::{ExplorationConfig, GenerationMethod, OptimizerConfig};
use crate::error::{Error, Result};
use crate::generate::{
    build_engine_state, GenerationRequest, GeneticGenerator, GridGenerator, ModelGenerator,
    Population,
};
use crate::hosts::{HostSpec, Inventory, LocalSystem};
use crate::launch::{BatchLauncher, SchedulingOptions, SimulationInput, SimulationStatus};
use crate::parallel::{
    HostResources, MemoryEstimate, Parallelization, Planner, RuntimeEstimator, SceneResources,
    TimingRecord,
};
use crate::params::{Range, Scale};
use crate::remote::{RemoteShell, RemoteSynchronizer, SyncSummary};
use crate::scene::SceneTemplate;
use crate::store::generation::{GenerationInfo, GenerationStatus};
use crate::store::tables::GenerationRecord;
use crate::store::{FittingRun, Generation, MemoryRecord, INITIAL_GENERATION};
use crate::units::Unit;

/// Result of exploring one generation.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub generation_name: String,
    pub status: GenerationStatus,
    pub nlaunched: usize,
    pub nrecurrent: usize,
    pub sync: Option<SyncSummary>,
    /// Non-fatal problems; the invocation still counts as a success
    pub errors: Vec<String>,
}

/// Orchestrates parameter exploration over a fitting run.
pub struct ParameterExplorer<'a> {
    config: &'a ExplorationConfig,
    run: FittingRun,
    inventory: Inventory,
    local: LocalSystem,
    confirm_restart: Box<dyn Fn(&[String]) -> bool + 'a>,
    cancel: Arc<AtomicBool>,
}

impl<'a> ParameterExplorer<'a> {
    pub fn new(config: &'a ExplorationConfig, run: FittingRun) -> Result<Self> {
        let inventory = if run.hosts_path().exists() {
            Inventory::load(&run.hosts_path())?
        } else {
            Inventory::new(Vec::new())
        };
        Ok(ParameterExplorer {
            config,
            run,
            inventory,
            local: LocalSystem::detect(),
            confirm_restart: Box::new(|_| false),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Predicate consulted before a restart removes generations.
    pub fn set_restart_confirmation(&mut self, confirm: impl Fn(&[String]) -> bool + 'a) {
        self.confirm_restart = Box::new(confirm);
    }

    /// Override the detected local machine layout.
    pub fn set_local_system(&mut self, system: LocalSystem) {
        self.local = system;
    }

    /// Flag observed between sweeps; raising it terminates polling promptly.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn run(&self) -> &FittingRun {
        &self.run
    }

    /// Explore `ngenerations` generations.
    pub fn explore(
        &mut self,
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        analyser: &dyn Analyser,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<Vec<GenerationOutcome>> {
        if let Some(from) = &self.config.restart_from {
            let removed = self.run.restart_from(from, &*self.confirm_restart)?;
            tracing::info!(generations = removed.len(), "cleared for restart");
        }

        let _lock = self.run.lock()?;
        self.probe_hosts(shells);

        let mut outcomes = Vec::new();
        for iteration in 0..self.config.ngenerations.max(1) {
            tracing::info!(iteration, "starting generation");
            let outcome = self.explore_generation(shells, analyser, progress)?;
            let stop = matches!(
                outcome.status,
                GenerationStatus::Empty | GenerationStatus::Aborted
            );
            outcomes.push(outcome);
            if stop || self.cancel.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Availability is probed once per run startup and cached.
    fn probe_hosts(&mut self, shells: &HashMap<String, Arc<dyn RemoteShell>>) {
        let deadline = Duration::from_secs_f64(self.config.sync.deadline);
        let ids = self.config.remotes.clone();
        self.inventory.probe_availability(&ids, |host| {
            shells
                .get(&host.id)
                .map(|shell| shell.connect(deadline).is_ok())
                .unwrap_or(false)
        });
    }

    // ---- one generation ---------------------------------------------------

    fn explore_generation(
        &mut self,
        shells: &HashMap<String, Arc<dyn RemoteShell>>,
        analyser: &dyn Analyser,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<GenerationOutcome> {
        let ngenerations_before = self.run.ngenerations()?;
        let mut scene = SceneTemplate::load(&self.run.ski_template_path())?;

        // 2. Parameter ranges: caller-provided, else around the best model,
        // else the run's defaults.
        let (ranges, scales) = self.resolve_ranges()?;

        // 3. Generation info for this iteration.
        let previous = self.run.last_generation_record()?;
        let mut info = self.derive_info(&scene, previous.as_ref())?;

        // 4. The population.
        let optimizer = self.load_optimizer_config()?;
        let mut generator = match self.config.method {
            GenerationMethod::Grid => ModelGenerator::Grid(GridGenerator::new()),
            GenerationMethod::Genetic => ModelGenerator::Genetic(GeneticGenerator::new(
                optimizer.clone(),
                self.config.recurrence.clone(),
                self.config.seed,
            )),
        };
        let request = GenerationRequest {
            ranges: ranges.clone(),
            scales: scales.clone(),
            fixed_initial: Vec::new(),
            npoints: self.config.npoints.clone(),
            weights: self.config.weights.clone(),
            nmodels: self.config.nsimulations,
        };
        let population = generator.generate(&self.run, &request)?;
        info.nsimulations = population.len();
        tracing::info!(
            generation = %info.name,
            individuals = population.len(),
            recurrent = population.recurrent.len(),
            "population generated"
        );

        // No non-recurrent individuals: nothing to simulate.
        if population.is_empty() {
            let mut generation = self.run.create_generation(info.clone(), &ranges, &scales)?;
            let now = Utc::now();
            generation.finalize(GenerationStatus::Empty, now)?;
            self.run.generations_table()?.set_finishing_time(&info.name, now)?;
            return Ok(GenerationOutcome {
                generation_name: info.name,
                status: GenerationStatus::Empty,
                nlaunched: 0,
                nrecurrent: population.recurrent.len(),
                sync: None,
                errors: Vec::new(),
            });
        }

        // 5. Shared input and the wavelength count.
        let representation = self.representation(&info.representation)?;
        let (input, nwavelengths) = self.assemble_input(info.wavelength_grid_level, &representation)?;

        // 6. Adjust the scene template for this generation.
        scene.set_npackages(info.npackages)?;
        scene.set_selfabsorption(info.selfabsorption)?;
        scene.set_transient_heating(info.transient_heating)?;
        if scene.wavelengths_filename().is_some() {
            let grid_name = self.wavelength_grid_name(info.wavelength_grid_level)?;
            scene.set_wavelengths_filename(&grid_name)?;
        }
        scene.set_dust_grid(&representation.dust_grid)?;

        // 7. Hosts and parallelization; planner failures abort before any
        // submission.
        let hosts = self.select_hosts(ngenerations_before)?;
        let memory = MemoryEstimate::for_scene(&scene, representation.ncells, nwavelengths)?;
        let resources = SceneResources {
            memory,
            nwavelengths,
            dustlib_dimension: scene.dustlib_dimension(),
        };
        let mut planner = Planner::new(self.config.seed);

        let mut parallelization_local = None;
        let mut parallelization_hosts: HashMap<String, Parallelization> = HashMap::new();
        if hosts.is_empty() {
            let plan = planner.plan(&resources, &HostResources::from_local(&self.local))?;
            tracing::debug!(parallelization = %plan, "local parallelization");
            parallelization_local = Some(plan);
        }
        for host in &hosts {
            let host_resources = self.host_resources(host);
            let plan = planner.plan(&resources, &host_resources)?;
            tracing::debug!(host = %host.id, parallelization = %plan, "host parallelization");
            parallelization_hosts.insert(host.id.clone(), plan);
        }

        // 8. Wall times for scheduler hosts, from the timing history.
        let scheduling = self.estimate_walltimes(&hosts, &parallelization_hosts, &info, nwavelengths)?;

        // 9. Persist the generation and its tables before anything submits.
        let mut generation = self.run.create_generation(info.clone(), &ranges, &scales)?;
        generation.advance_status(GenerationStatus::Planned).ok();
        let record_timing = self.record_timing(&hosts);

        let mut simulation_names = Vec::with_capacity(population.len());
        for individual in &population.individuals {
            let simulation_name = generate_simulation_name();
            generation.append_individual(&simulation_name, &individual.name)?;
            generation.append_parameters(&simulation_name, &individual.parameters)?;
            simulation_names.push(simulation_name);
        }

        // 10. Launch.
        let mut launcher = BatchLauncher::new(&self.config.launcher, &scene, &input);
        launcher.set_dry(self.config.dry);
        launcher.set_group(self.config.group);
        if let Some(plan) = parallelization_local {
            launcher.set_parallelization_local(plan);
        }
        for (host_id, plan) in &parallelization_hosts {
            launcher.set_parallelization_for_host(host_id, *plan);
        }
        for (host_id, options) in &scheduling {
            launcher.set_scheduling_options(host_id, options.clone());
        }
        for (simulation_name, individual) in simulation_names.iter().zip(&population.individuals) {
            launcher.add_to_queue(
                &generation,
                simulation_name,
                &individual.name,
                individual.parameters.clone(),
            );
        }

        let deadline = Duration::from_secs_f64(self.config.sync.deadline);
        let summary = launcher.launch(
            &generation,
            self.run.name(),
            &hosts.iter().collect::<Vec<_>>(),
            shells,
            deadline,
            progress,
        )?;
        generation.advance_status(GenerationStatus::Submitted)?;

        // 11. Post-launch check.
        let mut errors = Vec::new();
        self.check_simulations(&generation, &population, &summary, &mut errors)?;

        // 12. Synchronize until every record is terminal.
        let mut records = launcher.into_records();
        let host_map: HashMap<String, HostSpec> =
            hosts.iter().map(|h| (h.id.clone(), h.clone())).collect();
        let synchronizer =
            RemoteSynchronizer::new(&self.config.sync, self.config.launcher.keep_remote_output);
        if records
            .iter()
            .any(|r| r.status == SimulationStatus::Retrieved)
        {
            generation.advance_status(GenerationStatus::PartiallyRetrieved)?;
        }
        let sync_summary = synchronizer.synchronize(
            &generation,
            &mut records,
            &host_map,
            &shells_subset(shells, &host_map),
            analyser,
            &self.cancel,
        )?;
        tracing::info!("\n{}", sync_summary.render());
        for name in &sync_summary.attention {
            errors.push(format!("simulation '{name}' needs attention"));
        }

        // 13. Timing and memory rows, in submission order.
        if record_timing {
            self.record_tables(
                &records,
                &parallelization_hosts,
                parallelization_local,
                &summary.local_walls,
                &info,
                nwavelengths,
            )?;
        }

        // 14. Score bookkeeping and finalization.
        let scored = generation.chi_squared_table()?.rows()?.len();
        if scored > 0 {
            generation.advance_status(GenerationStatus::Scored)?;
        }
        let now = Utc::now();
        if info.method == GenerationMethod::Genetic {
            self.save_genetic_state(&generation, &info, &population, &simulation_names, &optimizer)?;
        }
        generation.finalize(GenerationStatus::Finalized, now)?;
        self.run.generations_table()?.set_finishing_time(&info.name, now)?;
        tracing::info!(generation = %info.name, scored, "generation finalized");

        Ok(GenerationOutcome {
            generation_name: info.name,
            status: GenerationStatus::Finalized,
            nlaunched: summary.launched.len(),
            nrecurrent: population.recurrent.len(),
            sync: Some(sync_summary),
            errors,
        })
    }

    // ---- derivation helpers -----------------------------------------------

    /// Caller ranges win; otherwise spread around the best model, clamped to
    /// the run's default ranges; otherwise the defaults (first-guess based).
    fn resolve_ranges(&self) -> Result<(BTreeMap<String, Range>, BTreeMap<String, Scale>)> {
        let mut ranges = BTreeMap::new();
        let mut scales = BTreeMap::new();
        let best = self.run.best_model()?;
        for parameter in &self.run.definition().free_parameters {
            scales.insert(parameter.label.clone(), parameter.scale);
            if let Some((min, max)) = self.config.ranges.get(&parameter.label) {
                ranges.insert(parameter.label.clone(), Range::new(*min, *max)?);
                continue;
            }
            if let Some(best) = &best {
                if let Some(value) = best.parameters.get(&parameter.label) {
                    let value = value.to(parameter.unit)?;
                    let spread = self.config.relative_spread;
                    let (default_lo, default_hi) = parameter.default_range.bounds();
                    let lo = (value.value / (1.0 + spread)).max(default_lo);
                    let hi = (value.value * (1.0 + spread)).min(default_hi);
                    ranges.insert(
                        parameter.label.clone(),
                        Range::new(
                            crate::units::Quantity::new(lo, parameter.unit),
                            crate::units::Quantity::new(hi.max(lo), parameter.unit),
                        )?,
                    );
                    continue;
                }
            }
            ranges.insert(parameter.label.clone(), parameter.default_range);
        }
        Ok((ranges, scales))
    }

    /// Next generation's metadata from the previous one plus the refinement
    /// switches.
    fn derive_info(
        &self,
        scene: &SceneTemplate,
        previous: Option<&GenerationRecord>,
    ) -> Result<GenerationInfo> {
        let nlevels = self.run.definition().wavelength_grids.len() as u32;
        let mut wavelength_grid_level = previous.map(|p| p.wavelength_grid_level).unwrap_or(0);
        if self.config.refine_spectral {
            if wavelength_grid_level + 1 >= nlevels {
                tracing::warn!(
                    level = wavelength_grid_level,
                    "cannot refine wavelength grid: highest level reached"
                );
            } else {
                wavelength_grid_level += 1;
            }
        }

        let representations = &self.run.definition().representations;
        let current_representation = previous
            .map(|p| p.representation.clone())
            .unwrap_or_else(|| representations[0].name.clone());
        let representation = if self.config.refine_spatial {
            let position = representations
                .iter()
                .position(|r| r.name == current_representation)
                .unwrap_or(0);
            if position + 1 >= representations.len() {
                tracing::warn!(
                    representation = %current_representation,
                    "cannot refine spatially: finest representation reached"
                );
                current_representation
            } else {
                representations[position + 1].name.clone()
            }
        } else {
            current_representation
        };

        let base_npackages = match previous {
            Some(p) => p.npackages,
            None => scene.npackages()?,
        };
        let npackages = match self.config.npackages_factor {
            Some(factor) => (base_npackages as f64 * factor).round() as u64,
            None => base_npackages,
        };

        let selfabsorption = match self.config.selfabsorption {
            Some(value) => value,
            None => match previous {
                Some(p) => p.self_absorption,
                None => scene.selfabsorption()?,
            },
        };
        let transient_heating = match self.config.transient_heating {
            Some(value) => value,
            None => match previous {
                Some(p) => p.transient_heating,
                None => scene.transient_heating()?,
            },
        };

        let now = Utc::now();
        let (name, index) = match self.config.method {
            GenerationMethod::Grid => (FittingRun::grid_generation_name(&now), None),
            GenerationMethod::Genetic => {
                if self.run.has_initial_genetic_generation()? {
                    let index = self.run.last_genetic_generation_index()?.unwrap_or(0) + 1;
                    (FittingRun::genetic_generation_name(index), Some(index))
                } else {
                    (INITIAL_GENERATION.to_string(), None)
                }
            }
        };

        Ok(GenerationInfo {
            name,
            index,
            method: self.config.method,
            wavelength_grid_level,
            representation,
            npackages,
            selfabsorption,
            transient_heating,
            nsimulations: 0,
            creation_time: now,
            finishing_time: None,
            status: GenerationStatus::Planned,
        })
    }

    fn representation(&self, name: &str) -> Result<crate::store::RepresentationSpec> {
        self.run
            .definition()
            .representations
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown representation '{name}'")))
    }

    fn wavelength_grid_name(&self, level: u32) -> Result<String> {
        self.run
            .definition()
            .wavelength_grids
            .get(level as usize)
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!("no wavelength grid for level {level}"))
            })
    }

    /// Input maps, the level's wavelength grid and the dust-grid tree file.
    fn assemble_input(
        &self,
        level: u32,
        representation: &crate::store::RepresentationSpec,
    ) -> Result<(SimulationInput, u64)> {
        let input_dir = self.run.input_dir();
        let mut input = SimulationInput::new();
        for map in &self.run.definition().input_maps {
            input.add_file(input_dir.join(map))?;
        }
        let grid_name = self.wavelength_grid_name(level)?;
        let grid_path = input_dir.join(&grid_name);
        input.add_file(&grid_path)?;
        let nwavelengths = crate::scene::wavelengths::count_wavelengths(&grid_path)?;
        tracing::debug!(nwavelengths, grid = %grid_name, "wavelength grid selected");

        if representation.dust_grid.is_file_tree() {
            if let Some(tree) = representation.dust_grid.filename() {
                input.add_file(input_dir.join(tree))?;
            }
        }
        Ok((input, nwavelengths))
    }

    /// Preferred hosts that passed the probe. Scheduler hosts sit out the
    /// first generation: no timing history exists to negotiate wall times.
    fn select_hosts(&self, ngenerations_before: usize) -> Result<Vec<HostSpec>> {
        if self.config.remotes.is_empty() {
            return Ok(Vec::new());
        }
        let alive = self.inventory.available_hosts(&self.config.remotes)?;
        let mut selected = Vec::new();
        for host in alive {
            if host.scheduler && ngenerations_before == 0 {
                tracing::warn!(
                    host = %host.id,
                    "not using scheduler host for the initial generation"
                );
                continue;
            }
            selected.push(host.clone());
        }
        if selected.is_empty() {
            tracing::warn!("every available host sits out this generation; running locally");
        }
        Ok(selected)
    }

    fn host_resources(&self, host: &HostSpec) -> HostResources {
        match &host.cluster {
            Some(cluster) => HostResources::from_cluster(cluster, cluster.nodes, host.mpi),
            None => {
                tracing::warn!(
                    host = %host.id,
                    "no cluster spec; planning with a conservative single-node layout"
                );
                HostResources {
                    nodes: 1,
                    sockets_per_node: 1,
                    cores_per_socket: 8,
                    memory_per_node: crate::units::Quantity::gibibytes(32.0),
                    mpi: host.mpi,
                    hyperthreading: false,
                    threads_per_core: 1,
                }
            }
        }
    }

    /// Timing recording is forced on whenever remote execution is used.
    fn record_timing(&self, hosts: &[HostSpec]) -> bool {
        if self.config.record_timing {
            return true;
        }
        if !hosts.is_empty() {
            tracing::warn!("record timing enabled because remote execution is used");
            return true;
        }
        false
    }

    /// Wall-time estimates per scheduler host from the timing history.
    fn estimate_walltimes(
        &self,
        hosts: &[HostSpec],
        parallelizations: &HashMap<String, Parallelization>,
        info: &GenerationInfo,
        nwavelengths: u64,
    ) -> Result<HashMap<String, SchedulingOptions>> {
        let mut scheduling = HashMap::new();
        let scheduler_hosts: Vec<&HostSpec> = hosts.iter().filter(|h| h.scheduler).collect();
        if scheduler_hosts.is_empty() {
            return Ok(scheduling);
        }
        let estimator = RuntimeEstimator::new(self.run.timing_table()?.records()?, 4);
        for host in scheduler_hosts {
            let parallelization = parallelizations
                .get(&host.id)
                .ok_or_else(|| Error::Configuration(format!("no plan for host '{}'", host.id)))?;
            let walltime = estimator
                .runtime_for(
                    &host.id,
                    host.cluster_name(),
                    parallelization,
                    info.npackages,
                    nwavelengths,
                )
                .unwrap_or(self.config.launcher.default_walltime);
            tracing::debug!(host = %host.id, walltime, "estimated wall time");
            let cluster = host.cluster.as_ref().expect("scheduler host has a cluster");
            let cores_per_node = cluster.cores_per_node();
            let nodes = parallelization.cores.div_ceil(cores_per_node).max(1);
            scheduling.insert(
                host.id.clone(),
                SchedulingOptions::new(walltime, nodes, cores_per_node),
            );
        }
        Ok(scheduling)
    }

    fn load_optimizer_config(&self) -> Result<OptimizerConfig> {
        let path = self.run.optimizer_config_path();
        if path.exists() {
            let stored: OptimizerConfig = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            if stored != self.config.optimizer {
                tracing::warn!("using the run's stored optimizer configuration");
            }
            Ok(stored)
        } else {
            Ok(self.config.optimizer.clone())
        }
    }

    /// Post-launch check: success, partial failure (failed rows removed
    /// from the parameters table) or complete failure (generation removed,
    /// fatal).
    fn check_simulations(
        &self,
        generation: &Generation,
        population: &Population,
        summary: &crate::launch::LaunchSummary,
        errors: &mut Vec<String>,
    ) -> Result<()> {
        if summary.launched.len() == population.len() {
            tracing::info!("all simulations were scheduled successfully");
            return Ok(());
        }
        if summary.launched.is_empty() {
            tracing::error!("no simulations could be launched: removing generation");
            self.run
                .generations_table()?
                .remove_entries(&[generation.name().to_string()])?;
            std::fs::remove_dir_all(generation.path())?;
            return Err(Error::Configuration(
                "no simulations could be launched; generation removed, try again later".to_string(),
            ));
        }

        let failed: Vec<String> = summary.failed.iter().map(|(name, _)| name.clone()).collect();
        tracing::error!(count = failed.len(), "launching failed for some models");
        let parameters = generation.parameters_table()?;
        for (name, reason) in &summary.failed {
            if let Some(values) = parameters.values_for(name)? {
                let rendered: Vec<String> = values
                    .iter()
                    .map(|(label, value)| format!("{label}={value}"))
                    .collect();
                tracing::error!(simulation = %name, parameters = %rendered.join(", "), reason = %reason, "failed model");
            }
            errors.push(format!("submission of '{name}' failed: {reason}"));
        }
        parameters.remove_simulations(&failed)?;
        Ok(())
    }

    /// Append timing and memory rows for scored simulations, in submission
    /// order.
    fn record_tables(
        &self,
        records: &[crate::launch::SimulationRecord],
        parallelization_hosts: &HashMap<String, Parallelization>,
        parallelization_local: Option<Parallelization>,
        local_walls: &HashMap<String, f64>,
        info: &GenerationInfo,
        nwavelengths: u64,
    ) -> Result<()> {
        let timing = self.run.timing_table()?;
        let memory = self.run.memory_table()?;
        for record in records {
            if record.status != SimulationStatus::Analyzed {
                continue;
            }
            let (host, cluster, parallelization) = match &record.host_id {
                Some(host_id) => {
                    let Some(plan) = parallelization_hosts.get(host_id) else {
                        continue;
                    };
                    let cluster = self
                        .inventory
                        .host(host_id)
                        .map(|h| h.cluster_name().to_string())
                        .unwrap_or_else(|_| "--".to_string());
                    (host_id.clone(), cluster, *plan)
                }
                None => {
                    let Some(plan) = parallelization_local else {
                        continue;
                    };
                    ("local".to_string(), "--".to_string(), plan)
                }
            };

            // Remote elapsed time includes queue wait and transfers; only
            // the runtime the simulator itself reports goes into the table.
            let wall_seconds = match local_walls.get(&record.simulation_name) {
                Some(wall) => *wall,
                None => match runtime_from_log(record) {
                    Some(runtime) => runtime,
                    None => {
                        tracing::debug!(
                            simulation = %record.simulation_name,
                            "log reports no runtime; skipping timing row"
                        );
                        continue;
                    }
                },
            };
            timing.append(&TimingRecord {
                simulation_name: record.simulation_name.clone(),
                host,
                cluster,
                processes: parallelization.processes(),
                threads_per_process: parallelization.threads_per_process,
                threads_per_core: parallelization.threads_per_core,
                data_parallel: parallelization.data_parallel,
                packages: info.npackages,
                nwavelengths,
                wall_seconds,
            })?;

            if let Some(peak_bytes) = peak_memory_from_log(record) {
                memory.append(&MemoryRecord {
                    simulation_name: record.simulation_name.clone(),
                    host: record.host_id.clone().unwrap_or_else(|| "local".to_string()),
                    peak_bytes,
                })?;
            }
        }
        Ok(())
    }

    /// Snapshot the GA state into the generation and the run-level files.
    fn save_genetic_state(
        &self,
        generation: &Generation,
        info: &GenerationInfo,
        population: &Population,
        simulation_names: &[String],
        optimizer: &OptimizerConfig,
    ) -> Result<()> {
        let scores: HashMap<String, f64> = generation
            .chi_squared_table()?
            .rows()?
            .into_iter()
            .collect();
        let units: Vec<Unit> = self
            .run
            .parameter_units()
            .into_iter()
            .map(|(_, unit)| unit)
            .collect();

        let mut entries = Vec::new();
        for (individual, simulation_name) in population.individuals.iter().zip(simulation_names) {
            entries.push((
                individual.clone(),
                Some(simulation_name.clone()),
                scores.get(simulation_name).copied(),
            ));
        }
        for recurrent in &population.recurrent {
            entries.push((
                recurrent.individual.clone(),
                None,
                recurrent.chi_squared,
            ));
        }

        let engine = build_engine_state(
            info.index.unwrap_or(0),
            self.run.free_parameter_labels(),
            &units,
            entries,
        )?;
        let engine_json = engine.to_json()?;
        let optimizer_json = serde_json::to_string_pretty(optimizer)?;
        let prng_json = population
            .prng_state
            .clone()
            .ok_or_else(|| Error::Configuration("genetic population carries no PRNG state".to_string()))?;

        // Snapshot inside the generation, then the run-level copies
        // atomically: the main state always equals the last finalized
        // genetic generation.
        std::fs::write(generation.engine_path(), &engine_json)?;
        std::fs::write(generation.prng_path(), &prng_json)?;
        std::fs::write(generation.optimizer_path(), &optimizer_json)?;
        self.run.write_state_file(&self.run.main_engine_path(), &engine_json)?;
        self.run.write_state_file(&self.run.main_prng_path(), &prng_json)?;
        self.run.write_state_file(&self.run.optimizer_config_path(), &optimizer_json)?;
        Ok(())
    }
}

/// Unique simulation name across the fitting run.
fn generate_simulation_name() -> String {
    format!("sim_{}", Uuid::new_v4().simple())
}

/// Compute runtime reported in the simulator log, in seconds.
fn runtime_from_log(record: &crate::launch::SimulationRecord) -> Option<f64> {
    let content = std::fs::read_to_string(simulator_log_path(record)).ok()?;
    for line in content.lines() {
        if let Some(rest) = line.split("Finished simulation in").nth(1) {
            let value: f64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(value);
        }
    }
    None
}

/// Peak memory reported in the simulator log, when present.
fn peak_memory_from_log(record: &crate::launch::SimulationRecord) -> Option<f64> {
    let content = std::fs::read_to_string(simulator_log_path(record)).ok()?;
    for line in content.lines() {
        if let Some(rest) = line.split("Peak memory usage:").nth(1) {
            let mut parts = rest.split_whitespace();
            let value: f64 = parts.next()?.parse().ok()?;
            let factor = match parts.next()? {
                "GB" => 1e9,
                "MB" => 1e6,
                "KB" => 1e3,
                _ => 1.0,
            };
            return Some(value * factor);
        }
    }
    None
}

fn simulator_log_path(record: &crate::launch::SimulationRecord) -> std::path::PathBuf {
    record
        .output_path
        .join(format!("{}_log.txt", record.simulation_name))
}

fn shells_subset(
    shells: &HashMap<String, Arc<dyn RemoteShell>>,
    hosts: &HashMap<String, HostSpec>,
) -> HashMap<String, Arc<dyn RemoteShell>> {
    shells
        .iter()
        .filter(|(id, _)| hosts.contains_key(*id))
        .map(|(id, shell)| (id.clone(), shell.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_names_are_unique() {
        let mut names = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(names.insert(generate_simulation_name()));
        }
    }

    #[test]
    fn test_log_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = crate::launch::SimulationRecord::new(
            "sim_x",
            "individual_0000",
            "gen",
            crate::params::ParameterVector::new(),
            dir.path().join("sim_x.ski"),
            dir.path().to_path_buf(),
        );
        record.output_path = dir.path().to_path_buf();
        std::fs::write(
            dir.path().join("sim_x_log.txt"),
            "... Finished simulation in 312.5 s (5m 12.5s)\n... Peak memory usage: 12.5 GB\n",
        )
        .unwrap();
        assert_eq!(runtime_from_log(&record), Some(312.5));
        assert_eq!(peak_memory_from_log(&record), Some(12.5e9));
    }

    #[test]
    fn test_log_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = crate::launch::SimulationRecord::new(
            "sim_y",
            "individual_0001",
            "gen",
            crate::params::ParameterVector::new(),
            dir.path().join("sim_y.ski"),
            dir.path().to_path_buf(),
        );
        record.output_path = dir.path().to_path_buf();
        std::fs::write(dir.path().join("sim_y_log.txt"), "... still running\n").unwrap();
        assert_eq!(runtime_from_log(&record), None);
    }
}
