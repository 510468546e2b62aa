//! Accrual - workforce and DC plan simulation
//!
//! ## Usage
//!
//! ```bash
//! # Import the census and simulate 2025 through 2027
//! accrual --config config/baseline.toml --baseline config/census.json run 2025-2027
//!
//! # Stop after a stage (resume later with the same command minus --until)
//! accrual run 2025-2027 --until 2027:event_generation
//!
//! # Check configuration and stored checkpoints without writing anything
//! accrual validate
//!
//! # Inspect finished years
//! accrual status
//! accrual summary --year 2026
//! ```
//!
//! Exit codes: 0 success, 1 I/O or usage, 2 configuration,
//! 3 dependency violation, 4 data quality, 5 transaction conflict.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use accrual_orchestrator::{
    load_census, load_compliance, load_summaries, parse_year_range, verify, CheckpointLog, FileStore, Orchestrator,
    OrchestratorError, RunContext, StopPoint,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Accrual: hazard-driven workforce and retirement plan simulation
#[derive(Parser)]
#[command(name = "accrual")]
#[command(about = "Multi-year workforce and DC plan accrual simulation", long_about = None)]
struct Cli {
    /// Scenario configuration (TOML)
    #[arg(long, global = true, default_value = "config/baseline.toml")]
    config: PathBuf,

    /// Census baseline (JSON array of employee records) for the first year
    #[arg(long, global = true)]
    baseline: Option<PathBuf>,

    /// Directory holding event logs, snapshots, reports, and checkpoints
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Override `simulation.random_seed`
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Override `simulation.scenario_id`
    #[arg(long, global = true)]
    scenario: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a year range, resuming from checkpoints
    Run {
        /// Years to simulate, e.g. 2025-2027
        years: String,

        /// Stop after this checkpoint, e.g. 2027:state_accumulation
        #[arg(long)]
        until: Option<String>,
    },

    /// Check configuration, baseline, and stored checkpoints without writing
    Validate,

    /// Show the checkpoint history
    Status,

    /// Print year summaries of completed years
    Summary {
        /// Only this year
        #[arg(long)]
        year: Option<i32>,

        /// Include the year's compliance records
        #[arg(long)]
        compliance: bool,
    },

    /// Remove a writer lock left by a killed process
    Unlock,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<OrchestratorError>()
                .map(OrchestratorError::exit_code)
                .unwrap_or(1);
            error!("❌ {:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(code as u8)
        }
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accrual=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "accrual.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run { ref years, ref until } => {
            let years = parse_year_range(years)?;
            let until = until.as_deref().map(str::parse::<StopPoint>).transpose()?;
            run(&cli, years, until)
        }
        Commands::Validate => validate(&cli),
        Commands::Status => status(&cli.data_dir),
        Commands::Summary { year, compliance } => summary(&cli.data_dir, year, compliance),
        Commands::Unlock => {
            if FileStore::force_unlock(&cli.data_dir).map_err(OrchestratorError::from)? {
                warn!(data_dir = %cli.data_dir.display(), "🔓 Writer lock removed");
            } else {
                info!(data_dir = %cli.data_dir.display(), "No writer lock present");
            }
            Ok(())
        }
    }
}

fn context(cli: &Cli) -> anyhow::Result<RunContext> {
    Ok(RunContext::load(&cli.config, cli.seed, cli.scenario.clone()).map_err(OrchestratorError::from)?)
}

fn census(path: &Path) -> anyhow::Result<Vec<accrual_core::CensusRecord>> {
    let records = load_census(path)
        .map_err(OrchestratorError::from)
        .with_context(|| format!("failed to load baseline {}", path.display()))?;
    Ok(records)
}

fn run(cli: &Cli, years: std::ops::RangeInclusive<i32>, until: Option<StopPoint>) -> anyhow::Result<()> {
    let ctx = context(cli)?;
    let mut orchestrator = Orchestrator::open(&ctx, &cli.data_dir)?;

    if let Some(path) = &cli.baseline {
        orchestrator.import_baseline(census(path)?)?;
    } else if !orchestrator.has_baseline() && *years.start() == ctx.start_year() {
        warn!("⚠️  No baseline snapshot in the data directory; pass --baseline <census.json>");
    }

    let report = orchestrator.run(years, until)?;
    println!(
        "completed years: {:?} ({} stages run, {} already checkpointed)",
        report.years_completed, report.stages_executed, report.stages_skipped
    );
    if let Some(stop) = report.stopped_at {
        println!("stopped after {}", stop);
    }
    Ok(())
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let ctx = context(cli)?;
    println!(
        "configuration ok: scenario {} plan {} years {}-{} seed {}",
        ctx.config().simulation.scenario_id,
        ctx.config().simulation.plan_design_id,
        ctx.start_year(),
        ctx.end_year(),
        ctx.seed()
    );

    if let Some(path) = &cli.baseline {
        let snapshot = accrual_core::YearSnapshot::from_census(ctx.start_year(), census(path)?)
            .map_err(OrchestratorError::from)?;
        println!("baseline ok: {} employees", snapshot.len());
    }

    let report = verify(&ctx, &FileStore::open(&cli.data_dir))?;
    println!(
        "data directory ok: {} checkpoints verified, baseline {}",
        report.checkpoints_verified,
        if report.baseline_present { "present" } else { "missing" }
    );
    match report.next {
        Some(next) => println!("next stage: {}", next),
        None => println!("all configured years complete"),
    }
    Ok(())
}

fn status(data_dir: &Path) -> anyhow::Result<()> {
    let store = FileStore::open(data_dir);
    let log = CheckpointLog::load(&store).map_err(OrchestratorError::from)?;
    if log.checkpoints().is_empty() {
        println!("no checkpoints in {}", data_dir.display());
        return Ok(());
    }
    println!("{:<6} {:<20} {:<26} {}", "YEAR", "STAGE", "COMPLETED", "HASH");
    for checkpoint in log.checkpoints() {
        println!(
            "{:<6} {:<20} {:<26} {}",
            checkpoint.simulation_year,
            checkpoint.stage.as_str(),
            checkpoint.completed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            &checkpoint.content_hash[..12.min(checkpoint.content_hash.len())]
        );
    }
    Ok(())
}

fn summary(data_dir: &Path, year: Option<i32>, compliance: bool) -> anyhow::Result<()> {
    let store = FileStore::open(data_dir);
    let summaries = load_summaries(&store)?;
    let selected: Vec<_> = summaries
        .into_iter()
        .filter(|s| year.is_none_or(|y| s.simulation_year == y))
        .collect();
    if selected.is_empty() {
        println!("no completed years");
        return Ok(());
    }

    for summary in &selected {
        println!("{}", serde_json::to_string_pretty(summary)?);
        if compliance {
            let report = load_compliance(&store, summary.simulation_year)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
