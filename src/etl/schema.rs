//! Run-scoped staging objects and the pre-migration truncate.
//!
//! Every kind gets a staging table holding its id mappings and a sequence
//! handing out its surrogate keys. Object names depend on the kind only, so
//! at most one run may use a target schema at a time.

use crate::etl::types::EntityKind;
use crate::prelude::Result;
use crate::store::TargetStore;
use std::sync::Arc;

/// DDL statement issued against the target store.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ddl {
    CreateStagingTable(EntityKind),
    DropStagingTable(EntityKind),
    CreateSequence(EntityKind),
    DropSequence(EntityKind),
}

/// Name of the staging table mapping source ids of `kind` to target ids.
pub fn staging_table(kind: EntityKind) -> String {
    format!("temp_table_{}", kind.name())
}

/// Name of the sequence assigning target ids of `kind`.
pub fn sequence(kind: EntityKind) -> String {
    format!("seq_{}_tmp", kind.name())
}

impl std::fmt::Display for Ddl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Ddl::CreateStagingTable(kind) => write!(
                f,
                "CREATE TABLE IF NOT EXISTS {} \
                 (id_src VARCHAR(255) NOT NULL UNIQUE, id_trg BIGINT NOT NULL UNIQUE)",
                staging_table(kind)
            ),
            Ddl::DropStagingTable(kind) => write!(f, "DROP TABLE {}", staging_table(kind)),
            Ddl::CreateSequence(kind) => {
                write!(f, "CREATE SEQUENCE IF NOT EXISTS {}", sequence(kind))
            }
            Ddl::DropSequence(kind) => write!(f, "DROP SEQUENCE IF EXISTS {}", sequence(kind)),
        }
    }
}

/// Creates, drops and truncates target objects on behalf of the orchestrator.
///
pub struct SchemaPreparer {
    target: Arc<dyn TargetStore>,
}

impl SchemaPreparer {
    pub fn new(target: Arc<dyn TargetStore>) -> Self {
        Self { target }
    }

    pub async fn create_staging(&self, kind: EntityKind) -> Result<()> {
        self.execute(Ddl::CreateStagingTable(kind)).await
    }

    pub async fn drop_staging(&self, kind: EntityKind) -> Result<()> {
        self.execute(Ddl::DropStagingTable(kind)).await
    }

    pub async fn create_sequence(&self, kind: EntityKind) -> Result<()> {
        self.execute(Ddl::CreateSequence(kind)).await
    }

    pub async fn drop_sequence(&self, kind: EntityKind) -> Result<()> {
        self.execute(Ddl::DropSequence(kind)).await
    }

    /// Empties all target tables, children first.
    pub async fn truncate(&self) -> Result<()> {
        for kind in EntityKind::truncate_order() {
            self.target.truncate_table(kind).await?;
            tracing::debug!(table = kind.table(), "Target table truncated.");
        }
        Ok(())
    }

    async fn execute(&self, ddl: Ddl) -> Result<()> {
        tracing::debug!(statement = %ddl, "Executing DDL.");
        self.target.execute_ddl(&ddl).await
    }
}
