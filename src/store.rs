//! Interfaces of the stores the migration engine talks to.
//!
//! The engine only needs a paged read capability from the source, chunk
//! transactions plus a few DDL/DML primitives from the target, and a place
//! to record run status. Backends:
//!
//! - [`document::DocumentSource`]: JSON-lines collection exports.
//! - [`postgres::PgTarget`], [`postgres::PgJobRepository`]: PostgreSQL.
//! - [`memory`]: in-process stores with foreign-key checks and failure
//!   injection.

pub mod document;
pub mod memory;
pub mod postgres;

use crate::etl::job::{JobRun, Step, StepStatus};
use crate::etl::schema::Ddl;
use crate::etl::types::{EntityKind, IdMapping, ResolvedEntity, SourceEntity, TargetEntity};
use crate::prelude::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Opaque position of the next page in a source collection.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(pub u64);

/// Request for one page of a source collection.
///
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// `None` requests the first page.
    pub token: Option<PageToken>,
    pub size: usize,
}

impl PageRequest {
    pub fn first(size: usize) -> Self {
        Self { token: None, size }
    }
}

/// One page of a source collection.
///
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` once the collection is exhausted.
    pub next: Option<PageToken>,
}

/// Read-only document store.
///
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Fetches one page of the `kind` collection in stable order.
    ///
    /// Failures are reported as `Error::Read`.
    async fn find_all(&self, kind: EntityKind, request: PageRequest) -> Result<Page<SourceEntity>>;
}

/// Relational store receiving migrated entities.
///
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Opens the transaction a single chunk is written in.
    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>>;

    /// Executes a DDL statement outside of any chunk transaction.
    ///
    /// Failures are reported as `Error::SchemaPreparation`.
    async fn execute_ddl(&self, ddl: &Ddl) -> Result<()>;

    /// Deletes every row of the `kind` table.
    async fn truncate_table(&self, kind: EntityKind) -> Result<()>;

    /// Returns every row of the `kind` table ordered by id.
    async fn fetch_rows(&self, kind: EntityKind) -> Result<Vec<TargetEntity>>;
}

/// Scoped transaction of one chunk.
///
/// Dropping the transaction without calling [`commit`](Self::commit) must
/// discard everything written through it.
///
#[async_trait]
pub trait ChunkTransaction: Send {
    /// Inserts `entities` of `kind`, drawing their surrogate keys from the
    /// kind's staging sequence.
    ///
    /// # Returns
    ///
    /// Assigned target ids, in the order of `entities`.
    ///
    async fn insert_batch(&mut self, kind: EntityKind, entities: &[ResolvedEntity])
    -> Result<Vec<i64>>;

    /// Persists id mappings into the kind's staging table.
    async fn record_mappings(&mut self, kind: EntityKind, mappings: &[IdMapping]) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Run metadata store.
///
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts or updates the run row.
    async fn save_run(&self, run: &JobRun) -> Result<()>;

    async fn record_step_start(&self, run_id: Uuid, step: Step) -> Result<()>;

    async fn record_step_end(
        &self,
        run_id: Uuid,
        step: Step,
        status: StepStatus,
        migrated: u64,
    ) -> Result<()>;
}
