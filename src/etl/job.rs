//! Orchestration of a complete migration run.
//!
//! A run executes a fixed, ordered plan of [`Step`]s strictly one after
//! another. Parent kinds are always migrated, and their ids mapped, before
//! any dependent kind is read. The first failing step stops the run; nothing
//! already committed is compensated. Recovering from a failed run means
//! starting a new one, which truncates the target tables again.

use crate::etl::mapper::IdMapper;
use crate::etl::schema::SchemaPreparer;
use crate::etl::step::MigrationStep;
use crate::etl::types::EntityKind;
use crate::prelude::{Error, Result};
use crate::store::{JobRepository, SourceStore, TargetStore};
use chrono::{DateTime, Utc};
use derive_more::Display;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unit of work of a run.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Truncate,
    CreateStaging(EntityKind),
    CreateSequence(EntityKind),
    Migrate(EntityKind),
    DropStaging(EntityKind),
    DropSequence(EntityKind),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Truncate => f.write_str("truncate"),
            Step::CreateStaging(kind) => write!(f, "create_staging_{}", kind),
            Step::CreateSequence(kind) => write!(f, "create_sequence_{}", kind),
            Step::Migrate(kind) => write!(f, "migrate_{}", kind),
            Step::DropStaging(kind) => write!(f, "drop_staging_{}", kind),
            Step::DropSequence(kind) => write!(f, "drop_sequence_{}", kind),
        }
    }
}

impl Step {
    /// The plan every run executes.
    pub fn plan() -> Vec<Step> {
        let mut plan = vec![Step::Truncate];
        plan.extend(EntityKind::ALL.map(Step::CreateStaging));
        plan.extend(EntityKind::ALL.map(Step::CreateSequence));
        plan.extend(EntityKind::ALL.map(Step::Migrate));
        plan.extend(EntityKind::ALL.map(Step::DropStaging));
        plan.extend(EntityKind::ALL.map(Step::DropSequence));
        plan
    }

    /// Checks that `plan` truncates first and migrates every kind after all
    /// of its parents, with the kind's staging objects in place.
    pub fn validate_plan(plan: &[Step]) -> Result<()> {
        if plan.first() != Some(&Step::Truncate) {
            return Err(Error::State("plan must start with truncate".to_owned()));
        }
        for (position, step) in plan.iter().enumerate() {
            let Step::Migrate(kind) = *step else {
                continue;
            };
            let before = &plan[..position];
            for parent in kind.parents() {
                if !before.contains(&Step::Migrate(*parent)) {
                    return Err(Error::State(format!(
                        "{} is migrated before its parent {}",
                        kind, parent
                    )));
                }
            }
            for required in [Step::CreateStaging(kind), Step::CreateSequence(kind)] {
                if !before.contains(&required) {
                    return Err(Error::State(format!("{} runs before {}", step, required)));
                }
            }
        }
        Ok(())
    }
}

/// Status of a run.
///
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    #[display("STARTING")]
    Starting,
    #[display("RUNNING")]
    Running,
    #[display("COMPLETED")]
    Completed,
    #[display("FAILED")]
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Status of a single step execution.
///
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    #[display("STARTED")]
    Started,
    #[display("COMPLETED")]
    Completed,
    #[display("FAILED")]
    Failed,
}

/// Bookkeeping of one run, mutated only by the orchestrator.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub current_phase: Option<Step>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Starting,
            current_phase: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Moves the run into `step`.
    pub fn enter(&mut self, step: Step) -> Result<()> {
        self.ensure_active()?;
        self.status = RunStatus::Running;
        self.current_phase = Some(step);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.status != RunStatus::Running {
            return Err(Error::State(format!("cannot complete a {} run", self.status)));
        }
        self.finish(RunStatus::Completed);
        Ok(())
    }

    /// Fails the run in its current phase.
    pub fn fail(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.status != RunStatus::Running {
            return Err(Error::State(format!("cannot fail a {} run", self.status)));
        }
        self.finish(RunStatus::Failed);
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status.is_terminal() {
            true => Err(Error::State(format!(
                "run {} is already {}",
                self.run_id, self.status
            ))),
            false => Ok(()),
        }
    }
}

impl Default for JobRun {
    fn default() -> Self {
        Self::new()
    }
}

/// What a run reports back to its caller.
///
#[derive(Debug)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub failed_phase: Option<Step>,
    pub error: Option<Error>,
    pub statistic: BTreeMap<EntityKind, u64>,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Converts a failed run into its underlying error.
    pub fn into_result(self) -> Result<BTreeMap<EntityKind, u64>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.statistic),
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run {} {}", self.run_id, self.status)?;
        if let Some(phase) = self.failed_phase {
            write!(f, " in {}", phase)?;
        }
        if let Some(error) = &self.error {
            write!(f, ": {}", error)?;
        }
        for (kind, migrated) in &self.statistic {
            write!(f, "\n  {}: {}", kind.table(), migrated)?;
        }
        Ok(())
    }
}

/// Tunables of a run.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Entities committed per chunk transaction.
    pub chunk_size: usize,
    /// Entities fetched per source page.
    pub page_size: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            page_size: 10,
        }
    }
}

/// Sole entry point of the migration engine.
///
pub struct Orchestrator {
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    repository: Arc<dyn JobRepository>,
    settings: JobSettings,
    plan: Vec<Step>,
    mapper: IdMapper,
}

impl Orchestrator {
    /// Creates new `Orchestrator` instance running the standard plan.
    ///
    /// # Arguments
    ///
    /// * `source`: Document store to read from.
    /// * `target`: Relational store to write into.
    /// * `repository`: Store of run and step status.
    /// * `settings`: Chunk and page sizes.
    ///
    pub fn new(
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
        repository: Arc<dyn JobRepository>,
        settings: JobSettings,
    ) -> Result<Self> {
        Self::with_plan(source, target, repository, settings, Step::plan())
    }

    /// Creates new `Orchestrator` instance running a custom plan.
    pub fn with_plan(
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
        repository: Arc<dyn JobRepository>,
        settings: JobSettings,
        plan: Vec<Step>,
    ) -> Result<Self> {
        if settings.chunk_size == 0 || settings.page_size == 0 {
            return Err(Error::NotSupported(
                "chunk and page sizes must be positive".to_owned(),
            ));
        }
        Step::validate_plan(&plan)?;

        Ok(Self {
            source,
            target,
            repository,
            settings,
            plan,
            mapper: IdMapper::new(),
        })
    }

    /// Mapper of the most recent run.
    pub fn mapper(&self) -> &IdMapper {
        &self.mapper
    }

    /// Executes a new run of the whole plan.
    ///
    /// # Returns
    ///
    /// `RunResult` of the run. A failed run carries the failing step and the
    /// underlying error.
    ///
    #[tracing::instrument(name = "run", skip(self))]
    pub async fn run(&mut self) -> RunResult {
        self.mapper.clear();
        let mut run = JobRun::new();
        let mut statistic = BTreeMap::new();
        tracing::info!(run_id = %run.run_id, settings = ?self.settings, "Migration run started.");

        if let Err(error) = self.repository.save_run(&run).await {
            return Self::aborted(run, error, statistic);
        }

        for step in self.plan.clone() {
            if let Err(error) = self.execute_step(&mut run, step, &mut statistic).await {
                tracing::error!(run_id = %run.run_id, %step, %error, "Migration run failed.");
                if run.fail().is_ok() {
                    if let Err(save_error) = self.repository.save_run(&run).await {
                        tracing::error!(run_id = %run.run_id, %save_error, "Failed run was not recorded.");
                    }
                }
                return RunResult {
                    run_id: run.run_id,
                    status: run.status,
                    failed_phase: Some(step),
                    error: Some(error),
                    statistic,
                };
            }
        }

        let completion = match run.complete() {
            Ok(()) => self.repository.save_run(&run).await,
            Err(error) => Err(error),
        };
        if let Err(error) = completion {
            return Self::aborted(run, error, statistic);
        }
        tracing::info!(run_id = %run.run_id, statistic = ?statistic, "Migration run completed.");

        RunResult {
            run_id: run.run_id,
            status: run.status,
            failed_phase: None,
            error: None,
            statistic,
        }
    }

    /// Runs a single step, recording its start and end.
    async fn execute_step(
        &mut self,
        run: &mut JobRun,
        step: Step,
        statistic: &mut BTreeMap<EntityKind, u64>,
    ) -> Result<()> {
        run.enter(step)?;
        self.repository.save_run(run).await?;
        self.repository.record_step_start(run.run_id, step).await?;
        tracing::info!(%step, "Step started.");

        match self.dispatch(step).await {
            Ok(migrated) => {
                if let Step::Migrate(kind) = step {
                    Self::collect_statistics(statistic, migrated, kind);
                }
                self.repository
                    .record_step_end(run.run_id, step, StepStatus::Completed, migrated)
                    .await
            }
            Err(error) => {
                if let Err(record_error) = self
                    .repository
                    .record_step_end(run.run_id, step, StepStatus::Failed, 0)
                    .await
                {
                    tracing::error!(%step, %record_error, "Step failure was not recorded.");
                }
                Err(error)
            }
        }
    }

    /// Interprets a step against the stores.
    ///
    /// # Returns
    ///
    /// On success, the number of migrated entities (zero for schema steps).
    ///
    async fn dispatch(&mut self, step: Step) -> Result<u64> {
        let schema = SchemaPreparer::new(self.target.clone());
        match step {
            Step::Truncate => schema.truncate().await.map(|_| 0),
            Step::CreateStaging(kind) => schema.create_staging(kind).await.map(|_| 0),
            Step::CreateSequence(kind) => schema.create_sequence(kind).await.map(|_| 0),
            Step::DropStaging(kind) => schema.drop_staging(kind).await.map(|_| 0),
            Step::DropSequence(kind) => schema.drop_sequence(kind).await.map(|_| 0),
            Step::Migrate(kind) => {
                let migration = MigrationStep::new(
                    self.source.as_ref(),
                    self.target.as_ref(),
                    self.settings.page_size,
                );
                let result = migration
                    .execute(&mut self.mapper, kind, self.settings.chunk_size)
                    .await?;
                Ok(result.migrated)
            }
        }
    }

    /// Accumulates migration statistics for a given kind.
    ///
    /// # Arguments
    ///
    /// * `statistic`: Statistics of the current run.
    /// * `migrated`: Number of migrated entities.
    /// * `kind`: Kind the statistics belongs to.
    ///
    fn collect_statistics(statistic: &mut BTreeMap<EntityKind, u64>, migrated: u64, kind: EntityKind) {
        *statistic.entry(kind).or_default() += migrated;
    }

    /// Result of a run that could not even be recorded.
    fn aborted(run: JobRun, error: Error, statistic: BTreeMap<EntityKind, u64>) -> RunResult {
        tracing::error!(run_id = %run.run_id, %error, "Migration run aborted.");
        RunResult {
            run_id: run.run_id,
            status: RunStatus::Failed,
            failed_phase: run.current_phase,
            error: Some(error),
            statistic,
        }
    }
}
