//! Reader → resolver → writer composition for one entity kind.

use crate::etl::mapper::IdMapper;
use crate::etl::reader::EntityReader;
use crate::etl::resolver;
use crate::etl::types::EntityKind;
use crate::etl::writer::ChunkWriter;
use crate::prelude::Result;
use crate::store::{SourceStore, TargetStore};
use futures::stream::{TryChunksError, TryStreamExt};

/// Outcome of a successful migration step.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub kind: EntityKind,
    pub migrated: u64,
}

/// Migrates one collection at a time.
///
pub struct MigrationStep<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    page_size: usize,
}

impl<'a> MigrationStep<'a> {
    pub fn new(source: &'a dyn SourceStore, target: &'a dyn TargetStore, page_size: usize) -> Self {
        Self {
            source,
            target,
            page_size,
        }
    }

    /// Streams the `kind` collection from the source store, resolves each
    /// chunk against `mapper` and commits it to the target store.
    ///
    /// Chunks commit in read order. The first failing chunk aborts the step;
    /// chunks committed before it stay committed.
    ///
    /// # Arguments
    ///
    /// * `mapper`: Mapper of the current run, extended chunk by chunk.
    /// * `kind`: Collection to migrate.
    /// * `chunk_size`: Number of entities committed per transaction.
    ///
    /// # Returns
    ///
    /// `StepResult` with the number of migrated entities.
    ///
    #[tracing::instrument(name = "migrate", skip(self, mapper, kind), fields(%kind))]
    pub async fn execute(
        &self,
        mapper: &mut IdMapper,
        kind: EntityKind,
        chunk_size: usize,
    ) -> Result<StepResult> {
        let writer = ChunkWriter::new(self.target);
        let mut chunks = Box::pin(
            EntityReader::new(self.source, kind, self.page_size)
                .into_stream()
                .try_chunks(chunk_size)
                .map_err(|TryChunksError(_, error)| error),
        );
        let mut migrated = 0;

        while let Some(chunk) = chunks.try_next().await? {
            tracing::trace!(size = %chunk.len(), %kind, "Resolve a chunk of source entities.");
            let resolved = resolver::resolve_chunk(chunk, mapper)?;
            migrated += writer.write(mapper, kind, resolved).await?;
        }

        tracing::info!(%kind, %migrated, "Step completed.");
        Ok(StepResult { kind, migrated })
    }
}
