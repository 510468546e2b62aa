//! Year pipeline driver
//!
//! Runs years strictly in order and, within a year, the five stages strictly
//! in order. Before a stage runs, its checkpoint decides whether it is already
//! done (hash match, skip) and the dependency registry confirms its inputs are
//! in place. After it runs, its artifacts are written atomically and a
//! checkpoint is appended. A crash between those two steps leaves the stage
//! unrecorded, so the next run recomputes it from the last checkpoint.

use std::ops::RangeInclusive;
use std::path::Path;

use accrual_core::{
    AccrualError, CensusRecord, EventPartition, PlanDesignId, ScenarioId, StatutoryLimits, YearSnapshot,
};
use accrual_simulation_engine::{
    validate_year, ComplianceCalculator, ComplianceReport, DependencyRegistry, EventGenerator, GenerationReport,
    StateAccumulator, YearArtifacts, YearSummary,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{combine, Checkpoint, CheckpointDecision, CheckpointLog};
use crate::context::RunContext;
use crate::error::{OrchestratorError, Result};
use crate::stage::{Stage, StopPoint};
use crate::store::{ArtifactKind, FileStore};

/// What the foundation stage pinned down for a year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundationRecord {
    pub simulation_year: i32,
    pub scenario_id: ScenarioId,
    pub plan_design_id: PlanDesignId,
    pub random_seed: u64,
    pub prior_year: i32,
    pub prior_active_count: usize,
    /// Hash of the finalized prior-year snapshot this year builds on
    pub prior_snapshot_hash: String,
    pub limits: StatutoryLimits,
}

/// Outcome of one `run` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Years whose reporting stage is checkpointed after this run
    pub years_completed: Vec<i32>,
    pub stages_executed: usize,
    pub stages_skipped: usize,
    /// Set when the run stopped early at `--until`
    pub stopped_at: Option<StopPoint>,
}

/// Single-writer pipeline over one data directory
pub struct Orchestrator<'a> {
    ctx: &'a RunContext,
    store: FileStore,
    checkpoints: CheckpointLog,
    registry: DependencyRegistry,
}

impl<'a> Orchestrator<'a> {
    /// Open a data directory for writing
    ///
    /// # Errors
    /// `TransactionConflict` if another process holds the writer lock.
    pub fn open(ctx: &'a RunContext, data_dir: &Path) -> Result<Self> {
        let store = FileStore::open_writer(data_dir)?;
        let checkpoints = CheckpointLog::load(&store)?;
        if let Some(last) = checkpoints.last_completed() {
            info!(
                year = last.simulation_year,
                stage = %last.stage,
                "🔁 Resuming after last checkpoint"
            );
        }
        Ok(Self {
            ctx,
            store,
            checkpoints,
            registry: DependencyRegistry::standard(),
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn checkpoints(&self) -> &CheckpointLog {
        &self.checkpoints
    }

    /// Store the census as the finalized snapshot for `start_year - 1`
    ///
    /// Importing the same census again is a no-op; a different census over an
    /// existing baseline is a `TransactionConflict`.
    pub fn import_baseline(&mut self, records: Vec<CensusRecord>) -> Result<()> {
        let start_year = self.ctx.start_year();
        let snapshot = YearSnapshot::from_census(start_year, records)?;
        self.store.write_snapshot(&snapshot)?;
        info!(
            year = snapshot.simulation_year(),
            employees = snapshot.len(),
            "👥 Baseline workforce imported"
        );
        Ok(())
    }

    /// Whether the baseline snapshot for the configured start year is in place
    pub fn has_baseline(&self) -> bool {
        use accrual_core::CompletionLedger;
        self.store.snapshot_finalized(self.ctx.start_year() - 1)
    }

    /// Run every stage of every year in `years`, resuming from checkpoints
    ///
    /// # Arguments
    /// * `years` - inclusive range inside the configured simulation years
    /// * `until` - stop after this (year, stage) is checkpointed
    ///
    /// # Errors
    /// The first stage failure, tagged with its year and stage. Earlier
    /// checkpoints are left intact.
    pub fn run(&mut self, years: RangeInclusive<i32>, until: Option<StopPoint>) -> Result<RunReport> {
        let configured = self.ctx.config().years();
        if years.start() < configured.start() || years.end() > configured.end() {
            return Err(AccrualError::config(
                "simulation",
                format!(
                    "requested years {}-{} fall outside configured {}-{}",
                    years.start(),
                    years.end(),
                    configured.start(),
                    configured.end()
                ),
            )
            .into());
        }

        info!(start = years.start(), end = years.end(), "🚀 Starting simulation run");
        let mut report = RunReport::default();
        for year in years {
            for stage in Stage::ALL {
                let decision = self
                    .checkpoints
                    .decide(&self.store, year, stage, self.ctx.config_hash())
                    .map_err(|e| OrchestratorError::stage(year, stage, e))?;
                match decision {
                    CheckpointDecision::Skip => {
                        debug!(year, stage = %stage, "⏭️  Already checkpointed");
                        report.stages_skipped += 1;
                    }
                    CheckpointDecision::Execute => {
                        self.execute(year, stage)
                            .map_err(|e| OrchestratorError::stage(year, stage, e))?;
                        report.stages_executed += 1;
                    }
                }

                let here = StopPoint { year, stage };
                if until == Some(here) {
                    info!(stop = %here, "⏸️  Stopping at requested checkpoint");
                    report.stopped_at = Some(here);
                    return Ok(report);
                }
            }
            report.years_completed.push(year);
            info!(year, "✅ Year complete");
        }

        info!(
            executed = report.stages_executed,
            skipped = report.stages_skipped,
            "🏁 Simulation run finished"
        );
        Ok(report)
    }

    fn execute(&mut self, year: i32, stage: Stage) -> accrual_core::Result<()> {
        self.registry.check(stage.as_str(), year, &self.store)?;
        if let Some(previous) = stage.previous() {
            if !self.checkpoints.is_complete(year, previous) {
                return Err(AccrualError::dependency(
                    year,
                    stage.as_str(),
                    format!("{} for {} must be checkpointed first", previous, year),
                ));
            }
        }

        info!(year, stage = %stage, "▶️  Running stage");
        let hashes = match stage {
            Stage::Foundation => self.foundation(year)?,
            Stage::EventGeneration => self.event_generation(year)?,
            Stage::StateAccumulation => self.state_accumulation(year)?,
            Stage::Validation => self.validation(year)?,
            Stage::Reporting => self.reporting(year)?,
        };

        self.checkpoints.record(
            &self.store,
            Checkpoint {
                simulation_year: year,
                stage,
                content_hash: combine(&hashes),
                config_hash: self.ctx.config_hash().to_string(),
                completed_at: Utc::now(),
            },
        )?;
        info!(year, stage = %stage, "📍 Checkpoint written");
        Ok(())
    }

    fn foundation(&self, year: i32) -> accrual_core::Result<Vec<String>> {
        let config = self.ctx.config();
        let prior = self.store.read_snapshot(year - 1)?;
        let record = FoundationRecord {
            simulation_year: year,
            scenario_id: config.simulation.scenario_id.clone(),
            plan_design_id: config.simulation.plan_design_id.clone(),
            random_seed: self.ctx.seed(),
            prior_year: prior.simulation_year(),
            prior_active_count: prior.active_count(),
            prior_snapshot_hash: self.store.hash(ArtifactKind::Snapshot, year - 1)?.unwrap_or_default(),
            limits: config.limits_for(year)?.clone(),
        };
        Ok(vec![self.store.write(ArtifactKind::Foundation, year, &record)?])
    }

    fn event_generation(&self, year: i32) -> accrual_core::Result<Vec<String>> {
        let prior = self.store.read_snapshot(year - 1)?;
        let outcome = EventGenerator::new(self.ctx.config(), self.ctx.seed()).generate(&prior, year)?;
        Ok(vec![
            self.store.write(ArtifactKind::Events, year, &outcome.partition)?,
            self.store.write(ArtifactKind::Generation, year, &outcome.report)?,
        ])
    }

    fn state_accumulation(&self, year: i32) -> accrual_core::Result<Vec<String>> {
        let prior = self.store.read_snapshot(year - 1)?;
        let partition: EventPartition = self.store.read(ArtifactKind::Events, year)?;
        let draft = StateAccumulator::new(self.ctx.config()).accumulate(&prior, &partition)?;
        Ok(vec![self.store.write(ArtifactKind::Draft, year, &draft)?])
    }

    fn validation(&self, year: i32) -> accrual_core::Result<Vec<String>> {
        let prior = self.store.read_snapshot(year - 1)?;
        let partition: EventPartition = self.store.read(ArtifactKind::Events, year)?;
        let generation: GenerationReport = self.store.read(ArtifactKind::Generation, year)?;
        let draft: YearSnapshot = self.store.read(ArtifactKind::Draft, year)?;
        let calculator = ComplianceCalculator::new(self.ctx.config())?;

        let report = validate_year(
            &YearArtifacts {
                prior: &prior,
                partition: &partition,
                generation: &generation,
                snapshot: &draft,
            },
            &calculator,
        )?;
        let finalized = draft.finalize();
        Ok(vec![
            self.store.write_snapshot(&finalized)?,
            self.store.write(ArtifactKind::Validation, year, &report)?,
        ])
    }

    fn reporting(&self, year: i32) -> accrual_core::Result<Vec<String>> {
        let prior = self.store.read_snapshot(year - 1)?;
        let snapshot = self.store.read_snapshot(year)?;
        let partition: EventPartition = self.store.read(ArtifactKind::Events, year)?;
        let generation: GenerationReport = self.store.read(ArtifactKind::Generation, year)?;

        let compliance = ComplianceCalculator::new(self.ctx.config())?.evaluate(&snapshot)?;
        let summary = YearSummary::build(&prior, &partition, &generation, &snapshot, &compliance);
        for shortfall in &summary.shortfalls {
            warn!(
                year,
                category = ?shortfall.category,
                requested = shortfall.requested,
                granted = shortfall.granted,
                "⚠️  Budget shortfall: {}",
                shortfall.constraint
            );
        }
        info!(
            year,
            opening = summary.opening_headcount,
            closing = summary.closing_headcount,
            hires = summary.hires,
            terminations = summary.terminations,
            participation = summary.participation_rate,
            "📊 Year summary"
        );
        Ok(vec![
            self.store.write(ArtifactKind::Compliance, year, &compliance)?,
            self.store.write(ArtifactKind::Summary, year, &summary)?,
        ])
    }
}

/// Result of a read-only integrity check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyReport {
    pub checkpoints_verified: usize,
    pub baseline_present: bool,
    /// First stage of the configured range still to run
    pub next: Option<StopPoint>,
}

/// Check a data directory against a configuration without writing anything
///
/// Every checkpoint must have been written under this configuration, its
/// artifacts must still hash to the recorded value, and its predecessor
/// stage must be checkpointed too.
pub fn verify(ctx: &RunContext, store: &FileStore) -> Result<VerifyReport> {
    use accrual_core::CompletionLedger;

    let log = CheckpointLog::load(store)?;
    let mut report = VerifyReport {
        baseline_present: store.snapshot_finalized(ctx.start_year() - 1),
        ..Default::default()
    };

    let mut checkpoints: Vec<&Checkpoint> = log.checkpoints().iter().collect();
    checkpoints.sort_by_key(|c| (c.simulation_year, c.stage));
    for checkpoint in checkpoints {
        let (year, stage) = (checkpoint.simulation_year, checkpoint.stage);
        log.decide(store, year, stage, ctx.config_hash())
            .map_err(|e| OrchestratorError::stage(year, stage, e))?;
        let predecessor_done = match stage.previous() {
            Some(previous) => log.is_complete(year, previous),
            None => year == ctx.start_year() || log.is_complete(year - 1, Stage::Reporting),
        };
        if !predecessor_done {
            return Err(OrchestratorError::stage(
                year,
                stage,
                AccrualError::dependency(year, stage.as_str(), "checkpointed before its predecessor"),
            ));
        }
        report.checkpoints_verified += 1;
    }

    report.next = ctx.config().years().find_map(|year| {
        Stage::ALL
            .into_iter()
            .find(|stage| !log.is_complete(year, *stage))
            .map(|stage| StopPoint { year, stage })
    });
    Ok(report)
}

/// Summaries of every year whose reporting stage is checkpointed
pub fn load_summaries(store: &FileStore) -> Result<Vec<YearSummary>> {
    let log = CheckpointLog::load(store)?;
    let mut summaries = Vec::new();
    for year in store.years(ArtifactKind::Summary)? {
        if log.is_complete(year, Stage::Reporting) {
            summaries.push(store.read(ArtifactKind::Summary, year)?);
        }
    }
    Ok(summaries)
}

/// Compliance report of a completed year
pub fn load_compliance(store: &FileStore, year: i32) -> Result<ComplianceReport> {
    Ok(store.read(ArtifactKind::Compliance, year)?)
}
