//! Commits resolved entities to the target store one chunk at a time.

use crate::etl::mapper::IdMapper;
use crate::etl::types::{EntityKind, IdMapping, ResolvedEntity};
use crate::prelude::{Error, Result};
use crate::store::{ChunkTransaction, TargetStore};

/// Chunk writer bound to one target store.
///
pub struct ChunkWriter<'a> {
    target: &'a dyn TargetStore,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(target: &'a dyn TargetStore) -> Self {
        Self { target }
    }

    /// Writes one chunk as a single atomic unit.
    ///
    /// Entities are inserted, their mappings recorded in the staging table,
    /// and the transaction committed. Only after the commit are the mappings
    /// published to `mapper`. Any failure rolls the chunk back, mappings
    /// included.
    ///
    /// # Arguments
    ///
    /// * `mapper`: Mapper of the current run.
    /// * `kind`: Kind of every entity in `chunk`.
    /// * `chunk`: Resolved entities, in read order.
    ///
    /// # Returns
    ///
    /// On success, the number of written entities.
    ///
    pub async fn write(
        &self,
        mapper: &mut IdMapper,
        kind: EntityKind,
        chunk: Vec<ResolvedEntity>,
    ) -> Result<u64> {
        if chunk.is_empty() {
            return Ok(0);
        }
        if let Some(stranger) = chunk.iter().find(|entity| entity.kind() != kind) {
            return Err(Error::Write(format!(
                "{} `{}` in a {} chunk",
                stranger.kind(),
                stranger.source_id,
                kind
            )));
        }
        mapper.ensure_unmapped(kind, chunk.iter().map(|entity| entity.source_id.as_str()))?;

        let mut transaction = self.target.begin_chunk().await?;
        let staged = Self::stage(&mut *transaction, kind, &chunk).await;
        match staged {
            Ok(mappings) => {
                transaction.commit().await?;
                let written = mappings.len() as u64;
                mapper.apply(mappings);
                tracing::debug!(%kind, size = %written, "Chunk committed.");
                Ok(written)
            }
            Err(error) => {
                tracing::warn!(%kind, %error, "Chunk failed, rolling back.");
                if let Err(rollback_error) = transaction.rollback().await {
                    tracing::error!(%kind, %rollback_error, "Chunk rollback failed.");
                }
                Err(error)
            }
        }
    }

    /// Inserts a chunk and records its mappings, without committing.
    async fn stage(
        transaction: &mut dyn ChunkTransaction,
        kind: EntityKind,
        chunk: &[ResolvedEntity],
    ) -> Result<Vec<IdMapping>> {
        let ids = transaction.insert_batch(kind, chunk).await?;
        if ids.len() != chunk.len() {
            return Err(Error::Write(format!(
                "{} of {} {} rows were assigned an id",
                ids.len(),
                chunk.len(),
                kind
            )));
        }

        let mappings = chunk
            .iter()
            .zip(ids)
            .map(|(entity, target_id)| IdMapping {
                kind,
                source_id: entity.source_id.clone(),
                target_id,
            })
            .collect::<Vec<_>>();
        transaction.record_mappings(kind, &mappings).await?;

        Ok(mappings)
    }
}
