//! Command-line interface for radiative-transfer model fitting.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use rtfit_core::analyse::Analyser;
use rtfit_core::launch::SimulationStatus;
use rtfit_core::remote::{RemoteShell, RemoteSynchronizer, SshShell, SyncSelection};
use rtfit_core::{
    CommandAnalyser, ExplorationConfig, FittingRun, GenerationMethod, Inventory, ParameterExplorer,
    SimulationRecord,
};

/// Automated radiative-transfer model fitting.
#[derive(Parser, Debug)]
#[command(name = "rtfit")]
#[command(version = "0.1.0")]
#[command(about = "Explore and synchronize radiative-transfer model fits")]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate, launch and score one or more generations
    Explore(ExploreArgs),
    /// Synchronize simulation states with the remote hosts
    Sync(SyncArgs),
}

#[derive(Parser, Debug)]
struct ExploreArgs {
    /// Path to the fitting run directory
    #[arg(long)]
    run: PathBuf,

    /// Population strategy
    #[arg(long, default_value = "genetic")]
    method: GenerationMethod,

    /// Number of generations for this invocation
    #[arg(long, default_value_t = 1)]
    ngenerations: usize,

    /// Requested simulations per generation
    #[arg(long, default_value_t = 100)]
    nsimulations: usize,

    /// Bump the wavelength grid level
    #[arg(long)]
    refine_spectral: bool,

    /// Advance to the next spatial representation
    #[arg(long)]
    refine_spatial: bool,

    /// Scale the number of photon packages by this factor
    #[arg(long)]
    increase_packages: Option<f64>,

    /// Override dust self-absorption
    #[arg(long, value_parser = parse_on_off)]
    selfabsorption: Option<bool>,

    /// Override transient heating
    #[arg(long, value_parser = parse_on_off)]
    transient_heating: Option<bool>,

    /// Remove this generation and everything after it, then explore
    #[arg(long)]
    restart_from: Option<String>,

    /// Stop just before every submit
    #[arg(long)]
    dry: bool,

    /// Comma-separated remote host ids
    #[arg(long, value_delimiter = ',')]
    remotes: Vec<String>,

    /// Pack multiple simulations into one scheduler job
    #[arg(long)]
    group: bool,

    /// Seed for every stochastic component
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Answer yes to the restart confirmation
    #[arg(long)]
    yes: bool,

    /// External analyser command (receives simulation name and output dir)
    #[arg(long)]
    analyser: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Load configuration from a JSON file (CLI flags override it)
    #[arg(long)]
    config_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SyncArgs {
    /// Path to the fitting run directory
    #[arg(long)]
    run: PathBuf,

    /// Comma-separated remote host ids (default: every configured host)
    #[arg(long, value_delimiter = ',')]
    remotes: Vec<String>,

    /// Simulations to act on, as host:index ranges (e.g. nancy:1-7,batch1:3)
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// Act on every simulation in one of these states
    #[arg(long, value_delimiter = ',')]
    statuses: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Command::Explore(args) => explore(args),
        Command::Sync(args) => sync(args),
    }
}

fn explore(args: ExploreArgs) -> Result<()> {
    let mut config = match &args.config_file {
        Some(path) => ExplorationConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ExplorationConfig::default(),
    };
    config.method = args.method;
    config.ngenerations = args.ngenerations;
    config.nsimulations = args.nsimulations;
    config.refine_spectral = args.refine_spectral;
    config.refine_spatial = args.refine_spatial;
    config.npackages_factor = args.increase_packages;
    config.selfabsorption = args.selfabsorption;
    config.transient_heating = args.transient_heating;
    config.restart_from = args.restart_from.clone();
    config.dry = args.dry;
    config.remotes = args.remotes.clone();
    config.group = args.group;
    config.seed = args.seed;

    let run = FittingRun::open(&args.run)
        .with_context(|| format!("opening fitting run at {}", args.run.display()))?;
    config.run_name = run.name().to_string();

    tracing::info!("Starting parameter exploration");
    tracing::info!("  Run: {}", run.name());
    tracing::info!("  Method: {}", config.method.as_str());
    tracing::info!("  Simulations per generation: {}", config.nsimulations);
    tracing::info!("  Generations: {}", config.ngenerations);
    if !config.remotes.is_empty() {
        tracing::info!("  Remote hosts: {}", config.remotes.join(", "));
    }

    let shells = build_shells(&run, &config.remotes)?;
    let analyser = build_analyser(args.analyser.clone());

    let mut explorer = ParameterExplorer::new(&config, run)?;
    let assume_yes = args.yes;
    explorer.set_restart_confirmation(move |generations: &[String]| {
        if assume_yes {
            return true;
        }
        confirm_on_stdin(generations)
    });

    let cancel = explorer.cancel_flag();
    ctrlc_handler(cancel);

    let pb = if !args.no_progress {
        let pb = ProgressBar::new(config.nsimulations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} simulations ({eta})")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };
    let pb_clone = pb.clone();
    let progress = move |current: usize, total: usize| {
        if let Some(ref pb) = pb_clone {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
        }
    };

    let outcomes = explorer.explore(&shells, analyser.as_ref(), Some(&progress))?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // Summary
    println!("\nExploration complete!");
    let mut had_errors = false;
    for outcome in &outcomes {
        println!(
            "  {}: {:?}, {} launched, {} recurrent",
            outcome.generation_name, outcome.status, outcome.nlaunched, outcome.nrecurrent
        );
        if let Some(sync) = &outcome.sync {
            print!("{}", indent(&sync.render(), "    "));
        }
        for error in &outcome.errors {
            had_errors = true;
            println!("    ! {error}");
        }
    }
    if had_errors {
        println!("\nSome simulations need attention; the run itself succeeded.");
    }
    Ok(())
}

fn sync(args: SyncArgs) -> Result<()> {
    let run = FittingRun::open(&args.run)
        .with_context(|| format!("opening fitting run at {}", args.run.display()))?;
    let inventory = Inventory::load(&run.hosts_path())
        .with_context(|| "loading hosts.json for the run")?;

    let remotes: Vec<String> = if args.remotes.is_empty() {
        inventory.list_hosts().iter().map(|h| h.id.clone()).collect()
    } else {
        args.remotes.clone()
    };
    let shells = build_shells(&run, &remotes)?;
    let hosts: HashMap<_, _> = remotes
        .iter()
        .filter_map(|id| inventory.host(id).ok())
        .map(|h| (h.id.clone(), h.clone()))
        .collect();

    let selection = parse_selection(&args)?;

    // Reconcile the most recent unfinished generation.
    let Some(generation_name) = run.generation_names()?.into_iter().last() else {
        bail!("run has no generations to synchronize");
    };
    let generation = run.generation(&generation_name)?;
    let mut records: Vec<SimulationRecord> = generation.simulation_records()?;
    if records.is_empty() {
        println!("No simulations to synchronize in generation '{generation_name}'.");
        return Ok(());
    }

    let config = rtfit_core::SyncConfig::default();
    let synchronizer = RemoteSynchronizer::new(&config, false);
    let analyser = build_analyser(None);
    let summary = synchronizer.sweep(&generation, &mut records, &hosts, &shells, analyser.as_ref())?;

    if !selection.is_empty() {
        let actions =
            synchronizer.apply_selection(&generation, &mut records, &hosts, &shells, &selection)?;
        for action in actions {
            println!("  {action}");
        }
    }

    println!("Generation '{generation_name}':");
    print!("{}", indent(&summary.render(), "  "));
    for error in &summary.errors {
        eprintln!("  ! {error}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_on_off(value: &str) -> std::result::Result<bool, String> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("expected 'on' or 'off', got '{other}'")),
    }
}

/// One SSH session per requested host.
fn build_shells(run: &FittingRun, remotes: &[String]) -> Result<HashMap<String, Arc<dyn RemoteShell>>> {
    let mut shells: HashMap<String, Arc<dyn RemoteShell>> = HashMap::new();
    if remotes.is_empty() {
        return Ok(shells);
    }
    let inventory = Inventory::load(&run.hosts_path())
        .with_context(|| format!("loading {}", run.hosts_path().display()))?;
    let control_dir = run.path().join(".ssh-control");
    std::fs::create_dir_all(&control_dir)?;
    for id in remotes {
        let host = inventory
            .host(id)
            .with_context(|| format!("unknown remote host '{id}'"))?;
        shells.insert(id.clone(), Arc::new(SshShell::new(host.clone(), &control_dir)));
    }
    Ok(shells)
}

/// The configured external analyser, or the built-in one that reads the
/// `<simulation>_chi2.dat` artifact.
fn build_analyser(command: Option<PathBuf>) -> Box<dyn Analyser> {
    match command {
        Some(command) => Box::new(CommandAnalyser {
            command,
            args: Vec::new(),
        }),
        None => Box::new(
            |record: &SimulationRecord, output_dir: &Path| -> rtfit_core::Result<f64> {
                let path = output_dir.join(format!("{}_chi2.dat", record.simulation_name));
                let content = std::fs::read_to_string(&path).map_err(|_| {
                    rtfit_core::Error::Configuration(format!(
                        "no chi-squared artifact at {}; pass --analyser",
                        path.display()
                    ))
                })?;
                content.trim().parse().map_err(|_| {
                    rtfit_core::Error::Configuration(format!(
                        "malformed chi-squared artifact at {}",
                        path.display()
                    ))
                })
            },
        ),
    }
}

fn confirm_on_stdin(generations: &[String]) -> bool {
    print!(
        "Are you absolutely sure all output of generations [{}] can be removed? [y/N] ",
        generations.join(", ")
    );
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn ctrlc_handler(cancel: Arc<std::sync::atomic::AtomicBool>) {
    // Polling loops observe the flag between sweeps; a second interrupt
    // kills the process the usual way.
    let result = ctrlc::set_handler(move || {
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        eprintln!("cancel requested; finishing in-flight transfers");
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "could not install the interrupt handler");
    }
}

/// Parse `host:1-7,host2:3` into the per-host index lists.
fn parse_selection(args: &SyncArgs) -> Result<SyncSelection> {
    let mut selection = SyncSelection::default();
    for spec in &args.ids {
        let (host, ranges) = spec
            .split_once(':')
            .with_context(|| format!("malformed --ids entry '{spec}', expected host:indices"))?;
        let mut indices = Vec::new();
        for part in ranges.split('+') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: usize = lo.parse().with_context(|| format!("bad index in '{spec}'"))?;
                let hi: usize = hi.parse().with_context(|| format!("bad index in '{spec}'"))?;
                indices.extend(lo..=hi);
            } else {
                indices.push(part.parse().with_context(|| format!("bad index in '{spec}'"))?);
            }
        }
        selection.ids.entry(host.to_string()).or_default().extend(indices);
    }
    for status in &args.statuses {
        let status: SimulationStatus = status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        selection.statuses.push(status);
    }
    Ok(selection)
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}\n"))
        .collect()
}
