//! In-process stores.
//!
//! [`MemoryTarget`] behaves like the PostgreSQL target where the engine can
//! observe it: staging objects must exist before they are used, sequences
//! are not transactional, foreign keys and unique source ids are enforced,
//! and chunk writes only become visible on commit. Failures can be injected
//! at chosen points.

use crate::etl::job::{JobRun, Step, StepStatus};
use crate::etl::schema::{self, Ddl};
use crate::etl::types::{EntityKind, IdMapping, ResolvedEntity, SourceEntity, TargetEntity};
use crate::prelude::{Error, Result};
use crate::store::{
    ChunkTransaction, JobRepository, Page, PageRequest, PageToken, SourceStore, TargetStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

// -----------------------------------------------------------------------------

/// Source store over collections held in memory.
///
#[derive(Default)]
pub struct MemorySource {
    collections: HashMap<EntityKind, Vec<SourceEntity>>,
    failing: HashSet<EntityKind>,
    pages_served: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entity to the collection of its kind.
    pub fn insert(&mut self, entity: SourceEntity) {
        self.collections.entry(entity.kind()).or_default().push(entity);
    }

    pub fn with(mut self, entities: impl IntoIterator<Item = SourceEntity>) -> Self {
        for entity in entities {
            self.insert(entity);
        }
        self
    }

    /// Makes every read of `kind` fail.
    pub fn fail_reads(&mut self, kind: EntityKind) {
        self.failing.insert(kind);
    }

    /// Number of pages returned so far.
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn find_all(&self, kind: EntityKind, request: PageRequest) -> Result<Page<SourceEntity>> {
        if self.failing.contains(&kind) {
            return Err(Error::Read(format!("{} collection is unavailable", kind.collection())));
        }
        let collection = self.collections.get(&kind).map_or(&[][..], Vec::as_slice);
        let start = request.token.map_or(0, |PageToken(offset)| offset as usize);
        let end = collection.len().min(start.saturating_add(request.size));
        let items = collection.get(start..end).unwrap_or_default().to_vec();
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        Ok(Page {
            items,
            next: (end < collection.len()).then_some(PageToken(end as u64)),
        })
    }
}

// -----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Database {
    tables: BTreeMap<EntityKind, BTreeMap<i64, TargetEntity>>,
    staging: HashMap<EntityKind, HashMap<String, i64>>,
    sequences: HashMap<EntityKind, i64>,
    inserts: HashMap<EntityKind, usize>,
    failing_inserts: HashMap<EntityKind, usize>,
    failing_ddl: HashSet<Ddl>,
    failing_truncate: HashSet<EntityKind>,
}

impl Database {
    fn row_exists(&self, kind: EntityKind, id: i64, pending: &[TargetEntity]) -> bool {
        self.tables
            .get(&kind)
            .is_some_and(|rows| rows.contains_key(&id))
            || pending
                .iter()
                .any(|row| row.kind() == kind && row.target_id == id)
    }

    fn is_referenced(&self, kind: EntityKind) -> bool {
        let Some(rows) = self.tables.get(&kind) else {
            return false;
        };
        self.tables.values().flat_map(BTreeMap::values).any(|child| {
            child
                .parent(kind)
                .is_some_and(|parent_id| rows.contains_key(&parent_id))
        })
    }
}

/// Target store kept in memory.
///
#[derive(Clone, Default)]
pub struct MemoryTarget {
    database: Arc<Mutex<Database>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `nth` (zero-based) insert of `kind` fail.
    pub async fn fail_insert(&self, kind: EntityKind, nth: usize) {
        self.database.lock().await.failing_inserts.insert(kind, nth);
    }

    /// Makes `ddl` fail.
    pub async fn fail_ddl(&self, ddl: Ddl) {
        self.database.lock().await.failing_ddl.insert(ddl);
    }

    /// Makes truncation of `kind` fail.
    pub async fn fail_truncate(&self, kind: EntityKind) {
        self.database.lock().await.failing_truncate.insert(kind);
    }

    /// Inserts rows directly, bypassing staging objects.
    pub async fn seed(&self, rows: impl IntoIterator<Item = TargetEntity>) {
        let mut database = self.database.lock().await;
        for row in rows {
            database
                .tables
                .entry(row.kind())
                .or_default()
                .insert(row.target_id, row);
        }
    }

    pub async fn row_count(&self, kind: EntityKind) -> usize {
        self.database.lock().await.tables.get(&kind).map_or(0, BTreeMap::len)
    }

    pub async fn has_staging_table(&self, kind: EntityKind) -> bool {
        self.database.lock().await.staging.contains_key(&kind)
    }

    pub async fn has_sequence(&self, kind: EntityKind) -> bool {
        self.database.lock().await.sequences.contains_key(&kind)
    }

    /// Mappings persisted in the staging table of `kind`.
    pub async fn staged_mappings(&self, kind: EntityKind) -> HashMap<String, i64> {
        self.database
            .lock()
            .await
            .staging
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>> {
        Ok(Box::new(MemoryChunk {
            database: self.database.clone(),
            rows: Vec::new(),
            mappings: Vec::new(),
        }))
    }

    async fn execute_ddl(&self, ddl: &Ddl) -> Result<()> {
        let mut database = self.database.lock().await;
        if database.failing_ddl.contains(ddl) {
            return Err(Error::schema(format!("`{}` was refused", ddl)));
        }
        match *ddl {
            Ddl::CreateStagingTable(kind) => {
                database.staging.entry(kind).or_default();
            }
            Ddl::DropStagingTable(kind) => {
                if database.staging.remove(&kind).is_none() {
                    return Err(Error::schema(format!(
                        "table {} does not exist",
                        schema::staging_table(kind)
                    )));
                }
            }
            Ddl::CreateSequence(kind) => {
                database.sequences.entry(kind).or_insert(0);
            }
            Ddl::DropSequence(kind) => {
                database.sequences.remove(&kind);
            }
        }
        Ok(())
    }

    async fn truncate_table(&self, kind: EntityKind) -> Result<()> {
        let mut database = self.database.lock().await;
        if database.failing_truncate.contains(&kind) {
            return Err(Error::write(format!("truncate of {} was refused", kind.table())));
        }
        if database.is_referenced(kind) {
            return Err(Error::write(format!(
                "rows of {} are still referenced",
                kind.table()
            )));
        }
        database.tables.remove(&kind);
        Ok(())
    }

    async fn fetch_rows(&self, kind: EntityKind) -> Result<Vec<TargetEntity>> {
        let database = self.database.lock().await;
        Ok(database
            .tables
            .get(&kind)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Pending writes of one chunk; applied on commit, discarded on drop.
///
struct MemoryChunk {
    database: Arc<Mutex<Database>>,
    rows: Vec<TargetEntity>,
    mappings: Vec<IdMapping>,
}

#[async_trait]
impl ChunkTransaction for MemoryChunk {
    async fn insert_batch(
        &mut self,
        kind: EntityKind,
        entities: &[ResolvedEntity],
    ) -> Result<Vec<i64>> {
        let mut database = self.database.lock().await;

        let attempt = database.inserts.entry(kind).or_insert(0);
        let nth = *attempt;
        *attempt += 1;
        if database.failing_inserts.get(&kind) == Some(&nth) {
            return Err(Error::write(format!("insert into {} was refused", kind.table())));
        }

        for entity in entities {
            for (&parent, &parent_id) in &entity.parents {
                if !database.row_exists(parent, parent_id, &self.rows) {
                    return Err(Error::write(format!(
                        "{} `{}` violates foreign key {}_id={}",
                        kind, entity.source_id, parent, parent_id
                    )));
                }
            }
        }

        let Some(sequence) = database.sequences.get_mut(&kind) else {
            return Err(Error::write(format!(
                "sequence {} does not exist",
                schema::sequence(kind)
            )));
        };
        let ids = entities
            .iter()
            .map(|_| {
                *sequence += 1;
                *sequence
            })
            .collect::<Vec<_>>();

        self.rows.extend(
            entities
                .iter()
                .cloned()
                .zip(&ids)
                .map(|(entity, &id)| entity.into_target(id)),
        );
        Ok(ids)
    }

    async fn record_mappings(&mut self, kind: EntityKind, mappings: &[IdMapping]) -> Result<()> {
        let database = self.database.lock().await;
        let Some(staged) = database.staging.get(&kind) else {
            return Err(Error::write(format!(
                "table {} does not exist",
                schema::staging_table(kind)
            )));
        };
        for mapping in mappings {
            let duplicate = staged.contains_key(&mapping.source_id)
                || self
                    .mappings
                    .iter()
                    .any(|pending| pending.kind == kind && pending.source_id == mapping.source_id);
            if duplicate {
                return Err(Error::write(format!(
                    "duplicate id_src `{}` in {}",
                    mapping.source_id,
                    schema::staging_table(kind)
                )));
            }
        }
        self.mappings.extend_from_slice(mappings);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryChunk {
            database,
            rows,
            mappings,
        } = *self;
        let mut database = database.lock().await;
        for row in rows {
            database
                .tables
                .entry(row.kind())
                .or_default()
                .insert(row.target_id, row);
        }
        for mapping in mappings {
            database
                .staging
                .entry(mapping.kind)
                .or_default()
                .insert(mapping.source_id, mapping.target_id);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// -----------------------------------------------------------------------------

/// Recorded execution of one step.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepExecution {
    pub run_id: Uuid,
    pub step: Step,
    pub status: StepStatus,
    pub migrated: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Run metadata kept in memory.
///
#[derive(Default)]
pub struct MemoryJobRepository {
    runs: Mutex<Vec<JobRun>>,
    steps: Mutex<Vec<StepExecution>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded runs, oldest first.
    pub async fn runs(&self) -> Vec<JobRun> {
        self.runs.lock().await.clone()
    }

    /// Recorded steps of `run_id`, in execution order.
    pub async fn steps(&self, run_id: Uuid) -> Vec<StepExecution> {
        self.steps
            .lock()
            .await
            .iter()
            .filter(|execution| execution.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn save_run(&self, run: &JobRun) -> Result<()> {
        let mut runs = self.runs.lock().await;
        match runs.iter_mut().find(|saved| saved.run_id == run.run_id) {
            Some(saved) => *saved = run.clone(),
            None => runs.push(run.clone()),
        }
        Ok(())
    }

    async fn record_step_start(&self, run_id: Uuid, step: Step) -> Result<()> {
        self.steps.lock().await.push(StepExecution {
            run_id,
            step,
            status: StepStatus::Started,
            migrated: 0,
            started_at: Utc::now(),
            ended_at: None,
        });
        Ok(())
    }

    async fn record_step_end(
        &self,
        run_id: Uuid,
        step: Step,
        status: StepStatus,
        migrated: u64,
    ) -> Result<()> {
        let mut steps = self.steps.lock().await;
        let Some(execution) = steps
            .iter_mut()
            .rev()
            .find(|execution| execution.run_id == run_id && execution.step == step)
        else {
            return Err(Error::NotFound(format!("step {} of run {}", step, run_id)));
        };
        execution.status = status;
        execution.migrated = migrated;
        execution.ended_at = Some(Utc::now());
        Ok(())
    }
}
