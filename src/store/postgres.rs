//! PostgreSQL target and run metadata store.
//!
//! Rows of a chunk are bulk inserted with one `UNNEST` statement per table;
//! surrogate keys are pulled from the kind's staging sequence first so the
//! written ids are known before the insert.

use crate::etl::job::{JobRun, Step, StepStatus};
use crate::etl::schema::{self, Ddl};
use crate::etl::types::{EntityKind, IdMapping, Payload, ResolvedEntity, TargetEntity};
use crate::prelude::{Error, Result};
use crate::store::{ChunkTransaction, JobRepository, TargetStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Builds and runs `INSERT INTO <table> (<columns>) SELECT * FROM UNNEST(...)`
/// for pre-collected column vectors.
///
/// # Returns
///
/// On success, the number of affected rows.
///
macro_rules! unnest_insert {
    (
        $executor:expr => $db_table_name:ident,
        [$(($index:literal, $db_field:ident, $values:expr, $sql_type:ident)),+ $(,)?]
    ) => {{
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::default();
        builder.push("INSERT INTO ").push(stringify!($db_table_name)).push(" (");
        {
            let mut columns = builder.separated(", ");
            $(columns.push(stringify!($db_field));)+
        }
        builder.push(")\nSELECT * FROM UNNEST(");
        {
            let mut arrays = builder.separated(", ");
            $(arrays.push(format!("${}::{}[]", $index, stringify!($sql_type)));)+
        }
        builder.push(")");

        builder
            .build()
            $(.bind($values))+
            .execute($executor)
            .await
            .map(|result| result.rows_affected())
    }};
}

/// Column holding the text payload of `kind`.
fn text_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Author => "full_name",
        EntityKind::Genre => "name",
        EntityKind::Book => "title",
        EntityKind::Comment => "comment_text",
    }
}

/// Column referencing the `parent` table.
fn parent_column(parent: EntityKind) -> String {
    format!("{}_id", parent.name())
}

fn parent_ids(
    kind: EntityKind,
    parent: EntityKind,
    entities: &[ResolvedEntity],
) -> Result<Vec<i64>> {
    entities
        .iter()
        .map(|entity| {
            entity.parent(parent).ok_or_else(|| {
                Error::Write(format!(
                    "{kind} {} carries no resolved {parent}",
                    entity.source_id
                ))
            })
        })
        .collect()
}

// -----------------------------------------------------------------------------

/// Target store backed by a PostgreSQL pool.
///
#[derive(Debug, Clone)]
pub struct PgTarget {
    pool: PgPool,
}

impl PgTarget {
    /// Connects to `url` and applies the bundled migrations creating the
    /// target tables.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(target: ">> target", "Connected, schema up to date.");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode_row(kind: EntityKind, row: &PgRow) -> sqlx::Result<TargetEntity> {
        let mut parents = BTreeMap::new();
        for &parent in kind.parents() {
            parents.insert(parent, row.try_get::<i64, _>(parent_column(parent).as_str())?);
        }

        Ok(TargetEntity {
            target_id: row.try_get("id")?,
            payload: Payload::from_text(kind, row.try_get::<String, _>(text_column(kind))?),
            parents,
        })
    }
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn begin_chunk(&self) -> Result<Box<dyn ChunkTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::write)?;
        Ok(Box::new(PgChunk { tx }))
    }

    async fn execute_ddl(&self, ddl: &Ddl) -> Result<()> {
        let statement = ddl.to_string();
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|error| Error::schema(format!("`{statement}`: {error}")))?;
        Ok(())
    }

    async fn truncate_table(&self, kind: EntityKind) -> Result<()> {
        let statement = format!("DELETE FROM {}", kind.table());
        let deleted = sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(Error::write)?
            .rows_affected();
        tracing::trace!(table = kind.table(), deleted, "Rows deleted.");
        Ok(())
    }

    async fn fetch_rows(&self, kind: EntityKind) -> Result<Vec<TargetEntity>> {
        let mut columns = vec!["id".to_owned(), text_column(kind).to_owned()];
        columns.extend(kind.parents().iter().map(|&parent| parent_column(parent)));
        let statement = format!(
            "SELECT {} FROM {} ORDER BY id",
            columns.join(", "),
            kind.table()
        );

        let rows = sqlx::query(&statement).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Self::decode_row(kind, row))
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(Error::from)
    }
}

/// Transaction of one chunk; rolled back when dropped uncommitted.
///
struct PgChunk {
    tx: Transaction<'static, Postgres>,
}

impl PgChunk {
    async fn next_ids(&mut self, kind: EntityKind, count: usize) -> Result<Vec<i64>> {
        let statement = format!(
            "SELECT nextval('{}') FROM generate_series(1, $1)",
            schema::sequence(kind)
        );
        let mut ids = sqlx::query_scalar::<_, i64>(&statement)
            .bind(count as i64)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(Error::write)?;
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl ChunkTransaction for PgChunk {
    async fn insert_batch(
        &mut self,
        kind: EntityKind,
        entities: &[ResolvedEntity],
    ) -> Result<Vec<i64>> {
        let ids = self.next_ids(kind, entities.len()).await?;
        let texts = entities
            .iter()
            .map(|entity| entity.payload.text().to_owned())
            .collect::<Vec<_>>();

        let inserted = match kind {
            EntityKind::Author => unnest_insert!(
                &mut *self.tx => authors,
                [(1, id, &ids, int8), (2, full_name, &texts, text)]
            ),
            EntityKind::Genre => unnest_insert!(
                &mut *self.tx => genres,
                [(1, id, &ids, int8), (2, name, &texts, text)]
            ),
            EntityKind::Book => {
                let authors = parent_ids(kind, EntityKind::Author, entities)?;
                let genres = parent_ids(kind, EntityKind::Genre, entities)?;
                unnest_insert!(
                    &mut *self.tx => books,
                    [
                        (1, id, &ids, int8),
                        (2, title, &texts, text),
                        (3, author_id, &authors, int8),
                        (4, genre_id, &genres, int8),
                    ]
                )
            }
            EntityKind::Comment => {
                let books = parent_ids(kind, EntityKind::Book, entities)?;
                unnest_insert!(
                    &mut *self.tx => comments,
                    [
                        (1, id, &ids, int8),
                        (2, comment_text, &texts, text),
                        (3, book_id, &books, int8),
                    ]
                )
            }
        }
        .map_err(Error::write)?;

        if inserted != entities.len() as u64 {
            return Err(Error::Write(format!(
                "{} of {} {kind} rows inserted",
                inserted,
                entities.len()
            )));
        }
        Ok(ids)
    }

    async fn record_mappings(&mut self, kind: EntityKind, mappings: &[IdMapping]) -> Result<()> {
        let (sources, targets): (Vec<String>, Vec<i64>) = mappings
            .iter()
            .map(|mapping| (mapping.source_id.clone(), mapping.target_id))
            .unzip();
        let statement = format!(
            "INSERT INTO {} (id_src, id_trg) SELECT * FROM UNNEST($1::text[], $2::int8[])",
            schema::staging_table(kind)
        );

        sqlx::query(&statement)
            .bind(&sources)
            .bind(&targets)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::write)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgChunk { tx } = *self;
        tx.commit().await.map_err(Error::write)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgChunk { tx } = *self;
        tx.rollback().await.map_err(Error::write)
    }
}

// -----------------------------------------------------------------------------

/// Run and step metadata kept in `migration_job_execution` and
/// `migration_step_execution`.
///
#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn save_run(&self, run: &JobRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO migration_job_execution (run_id, status, current_phase, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (run_id) DO UPDATE SET
                status = EXCLUDED.status,
                current_phase = EXCLUDED.current_phase,
                ended_at = EXCLUDED.ended_at",
        )
        .bind(run.run_id)
        .bind(run.status.to_string())
        .bind(run.current_phase.map(|step| step.to_string()))
        .bind(run.started_at)
        .bind(run.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_step_start(&self, run_id: Uuid, step: Step) -> Result<()> {
        sqlx::query(
            "INSERT INTO migration_step_execution (run_id, step, status, started_at)
            VALUES ($1, $2, $3, $4)",
        )
        .bind(run_id)
        .bind(step.to_string())
        .bind(StepStatus::Started.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_step_end(
        &self,
        run_id: Uuid,
        step: Step,
        status: StepStatus,
        migrated: u64,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE migration_step_execution
            SET status = $3, migrated = $4, ended_at = $5
            WHERE id = (
                SELECT max(id) FROM migration_step_execution
                WHERE run_id = $1 AND step = $2
            )",
        )
        .bind(run_id)
        .bind(step.to_string())
        .bind(status.to_string())
        .bind(migrated as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(format!("step {step} of run {run_id}")));
        }
        Ok(())
    }
}
