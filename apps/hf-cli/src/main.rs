use clap::{Parser, Subcommand};
use hf_app::{
    AppResult, Bracket, SearchProgressEvent, SearchStage, StudyConfig, SweepMode, SweepReport,
    experiments,
};
use hf_core::{kg, kinetic_energy_j, mps};
use hf_model::{Formulation, Stiffness};
use hf_results::RunStore;
use hf_solver::SolveResult;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hf-cli")]
#[command(about = "hammerflow CLI - optimal control of a variable-stiffness hammer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one formulation for every configured stiffness regime
    Optimize {
        /// Study YAML file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// direct, tracking or flat (overrides the config)
        #[arg(long)]
        formulation: Option<String>,
        /// Solve the regimes in parallel
        #[arg(long)]
        parallel: bool,
        /// Do not write runs to the output directory
        #[arg(long)]
        no_save: bool,
    },
    /// Bisect for the shortest feasible maneuver
    Search {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        formulation: Option<String>,
        /// low, high or variable
        #[arg(long, default_value = "variable")]
        stiffness: String,
        #[arg(long)]
        tf_min: Option<f64>,
        #[arg(long)]
        tf_max: Option<f64>,
        #[arg(long)]
        tol: Option<f64>,
        #[arg(long)]
        no_save: bool,
    },
    /// Solve the differentially-flat formulation
    Flat {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        no_save: bool,
    },
    /// Solve the car lane-change maneuver
    Car {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        no_save: bool,
    },
    /// Check that the optimal objective never worsens as tf grows
    Probe {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Comma-separated horizons in seconds, e.g. 1.0,1.5,2.0
        #[arg(long, value_delimiter = ',', required = true)]
        horizons: Vec<f64>,
        #[arg(long)]
        formulation: Option<String>,
        #[arg(long, default_value = "variable")]
        stiffness: String,
        /// Objective difference treated as noise
        #[arg(long, default_value_t = 1e-6)]
        tol: f64,
    },
    /// List stored runs
    Runs {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Only runs of this experiment
        #[arg(long)]
        experiment: Option<String>,
    },
    /// Export stored trajectories as CSV
    Export {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Export a single run (otherwise every optimal run)
        #[arg(long)]
        run_id: Option<String>,
        /// Output file for --run-id, output directory otherwise
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        experiment: Option<String>,
    },
    /// Print the default study configuration as YAML
    DefaultConfig,
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            config,
            formulation,
            parallel,
            no_save,
        } => cmd_optimize(config.as_deref(), formulation.as_deref(), parallel, !no_save),
        Commands::Search {
            config,
            formulation,
            stiffness,
            tf_min,
            tf_max,
            tol,
            no_save,
        } => cmd_search(
            config.as_deref(),
            formulation.as_deref(),
            &stiffness,
            (tf_min, tf_max, tol),
            !no_save,
        ),
        Commands::Flat {
            config,
            parallel,
            no_save,
        } => cmd_flat(config.as_deref(), parallel, !no_save),
        Commands::Car { config, no_save } => cmd_car(config.as_deref(), !no_save),
        Commands::Probe {
            config,
            horizons,
            formulation,
            stiffness,
            tol,
        } => cmd_probe(
            config.as_deref(),
            &horizons,
            formulation.as_deref(),
            &stiffness,
            tol,
        ),
        Commands::Runs { config, experiment } => cmd_runs(config.as_deref(), experiment.as_deref()),
        Commands::Export {
            config,
            run_id,
            output,
            experiment,
        } => cmd_export(
            config.as_deref(),
            run_id.as_deref(),
            output.as_deref(),
            experiment.as_deref(),
        ),
        Commands::DefaultConfig => {
            print!("{}", StudyConfig::default().to_yaml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> AppResult<StudyConfig> {
    match path {
        Some(path) => {
            println!("Loading study: {}", path.display());
            StudyConfig::load(path)
        }
        None => {
            tracing::debug!("no study file given, using defaults");
            Ok(StudyConfig::default())
        }
    }
}

fn open_store(config: &StudyConfig, save: bool) -> AppResult<Option<RunStore>> {
    if !save {
        return Ok(None);
    }
    tracing::debug!(dir = %config.output_dir.display(), "opening run store");
    Ok(Some(RunStore::new(config.output_dir.clone())?))
}

fn pick_formulation(config: &StudyConfig, flag: Option<&str>) -> AppResult<Formulation> {
    match flag {
        Some(tag) => Ok(tag.parse::<Formulation>()?),
        None => Ok(config.formulation),
    }
}

fn sweep_mode(parallel: bool) -> SweepMode {
    if parallel {
        SweepMode::Parallel
    } else {
        SweepMode::Sequential
    }
}

fn cmd_optimize(
    config_path: Option<&Path>,
    formulation: Option<&str>,
    parallel: bool,
    save: bool,
) -> AppResult<()> {
    let config = load_config(config_path)?;
    let formulation = pick_formulation(&config, formulation)?;
    let store = open_store(&config, save)?;
    println!(
        "Optimizing {} model at tf = {:.3} s on {} intervals",
        formulation, config.tf, config.n_nodes
    );
    let report = experiments::dynamic_model_optimize(
        &config,
        formulation,
        sweep_mode(parallel),
        store.as_ref(),
    )?;
    print_sweep(&config, &report);
    Ok(())
}

fn cmd_flat(config_path: Option<&Path>, parallel: bool, save: bool) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config, save)?;
    println!("Solving flat model at tf = {:.3} s", config.tf);
    let report = experiments::flat_model_solve(&config, sweep_mode(parallel), store.as_ref())?;
    print_sweep(&config, &report);
    Ok(())
}

fn print_sweep(config: &StudyConfig, report: &SweepReport) {
    println!(
        "\n{:<10} {:<12} {:>14} {:>12} {:>10}",
        "regime", "status", "objective", "violation", "time [s]"
    );
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(r) => println!(
                "{:<10} {:<12} {:>14} {:>12.2e} {:>10.3}",
                outcome.regime.tag(),
                r.termination_status.label(),
                r.objective_value
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_else(|| "-".to_string()),
                r.constraint_violation,
                r.wall_time_s
            ),
            Err(e) => println!("{:<10} error: {}", outcome.regime.tag(), e),
        }
    }
    if let Some(best) = report.best() {
        println!("\nBest regime: {}", best.regime);
        if let Some(hv) = best.trajectory.final_value("hv") {
            print_impact(config, hv);
        }
    }
}

fn print_impact(config: &StudyConfig, hv_end: f64) {
    let mass = kg(config.params.h_mass);
    let speed = mps(hv_end);
    println!(
        "  Hammer impact: {:.4} m/s, {:.4} J",
        speed.value,
        kinetic_energy_j(mass, speed)
    );
}

fn cmd_search(
    config_path: Option<&Path>,
    formulation: Option<&str>,
    stiffness: &str,
    (tf_min, tf_max, tol): (Option<f64>, Option<f64>, Option<f64>),
    save: bool,
) -> AppResult<()> {
    let config = load_config(config_path)?;
    let formulation = pick_formulation(&config, formulation)?;
    let stiffness: Stiffness = stiffness.parse()?;
    let bracket = Bracket::new(
        tf_min.unwrap_or(config.search.tf_min),
        tf_max.unwrap_or(config.search.tf_max),
        tol.unwrap_or(config.search.tol),
    )?;
    let store = open_store(&config, save)?;
    println!(
        "Searching shortest {} / {} maneuver in [{:.3}, {:.3}] s (tol {:.1e})",
        formulation, stiffness, bracket.tf_min, bracket.tf_max, bracket.tol
    );

    let outcome = experiments::dynamic_model_binary_search(
        &config,
        formulation,
        stiffness,
        bracket,
        store.as_ref(),
        Some(&mut |event| render_search_progress(&event)),
    )?;
    clear_progress_line();

    println!("✓ tf* = {:.4} s after {} solves", outcome.tf_star, outcome.iterations);
    println!("  Final interval: [{:.4}, {:.4}]", outcome.tf_min, outcome.tf_max);
    for trial in &outcome.trials {
        println!(
            "  tf = {:>8.4}  {:<12} {}",
            trial.tf,
            trial.status.label(),
            trial
                .objective
                .map(|v| format!("{v:.6}"))
                .unwrap_or_default()
        );
    }
    if let Some(hv) = outcome.result.trajectory.final_value("hv") {
        print_impact(&config, hv);
    }
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_search_progress(event: &SearchProgressEvent) {
    if event.stage != SearchStage::Solving {
        return;
    }
    print!(
        "\r  iter {:>2}  tf = {:.4}  interval = [{:.4}, {:.4}]  elapsed = {:.1}s",
        event.iteration, event.tf, event.tf_min, event.tf_max, event.elapsed_wall_s
    );
    let _ = io::stdout().flush();
}

fn cmd_car(config_path: Option<&Path>, save: bool) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config, save)?;
    println!(
        "Solving car maneuver: tf = {:.1} s, {} intervals",
        config.car.tf, config.car.n_nodes
    );
    let result = experiments::car_maneuver(&config, store.as_ref())?;
    print_solve(&result);
    if let Some(y) = result.trajectory.final_value("y") {
        println!("  Final lateral position: {:.3} m", y);
    }
    Ok(())
}

fn print_solve(result: &SolveResult) {
    println!("  Status: {}", result.status);
    if let Some(objective) = result.objective_value {
        println!("  Objective: {:.6}", objective);
    }
    println!("  Violation: {:.2e}", result.constraint_violation);
    println!("  Iterations: {}", result.iterations);
    println!("  Wall time: {:.3} s", result.wall_time_s);
}

fn cmd_probe(
    config_path: Option<&Path>,
    horizons: &[f64],
    formulation: Option<&str>,
    stiffness: &str,
    tol: f64,
) -> AppResult<()> {
    let config = load_config(config_path)?;
    let formulation = pick_formulation(&config, formulation)?;
    let stiffness: Stiffness = stiffness.parse()?;
    let report = experiments::monotonicity_probe(&config, formulation, stiffness, horizons, tol)?;

    println!("{:>8} {:<12} {:>14}", "tf [s]", "status", "objective");
    for p in &report.points {
        println!(
            "{:>8.3} {:<12} {:>14}",
            p.tf,
            p.status.label(),
            p.objective
                .map(|v| format!("{v:.6}"))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    if report.is_monotone() {
        println!("✓ Objective is monotone in tf");
    } else {
        println!("✗ {} inversion(s):", report.violations.len());
        for v in &report.violations {
            println!(
                "  tf = {:.3} beats tf = {:.3} ({:?} vs {:?})",
                v.earlier.tf, v.later.tf, v.earlier.objective, v.later.objective
            );
        }
    }
    Ok(())
}

fn cmd_runs(config_path: Option<&Path>, experiment: Option<&str>) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = RunStore::new(config.output_dir.clone())?;
    let runs = store.list_runs(experiment)?;

    if runs.is_empty() {
        println!("No runs found in {}", config.output_dir.display());
    } else {
        println!("Runs in {}:", config.output_dir.display());
        for m in runs {
            println!(
                "  {}  {}  {:<28} {:<9} {:<9} tf={:<8.4} {:<11} {}",
                &m.run_id[..m.run_id.len().min(12)],
                m.timestamp,
                m.experiment,
                m.formulation.as_deref().unwrap_or("-"),
                m.regime.as_deref().unwrap_or("-"),
                m.tf,
                m.status,
                m.objective.map(|v| format!("{v:.6}")).unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn cmd_export(
    config_path: Option<&Path>,
    run_id: Option<&str>,
    output: Option<&Path>,
    experiment: Option<&str>,
) -> AppResult<()> {
    let config = load_config(config_path)?;
    let store = RunStore::new(config.output_dir.clone())?;

    match run_id {
        Some(run_id) => {
            let path = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("{run_id}.csv")));
            experiments::export_run(&store, run_id, &path)?;
            println!("✓ Exported {} to {}", run_id, path.display());
        }
        None => {
            let dir = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.output_dir.join("csv"));
            let written = experiments::export_optimal_trajectories(&store, experiment, &dir)?;
            println!("✓ Exported {} optimal trajectories to {}", written.len(), dir.display());
        }
    }
    Ok(())
}
