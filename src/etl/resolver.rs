//! Rewrites parent references from source ids to target ids.

use crate::etl::mapper::IdMapper;
use crate::etl::types::{ResolvedEntity, SourceEntity};
use crate::prelude::{Error, Result};
use std::collections::BTreeMap;

/// Resolves every parent reference `entity` must carry.
///
/// # Arguments
///
/// * `entity`: Entity read from the source store.
/// * `mapper`: Mappings of all entities migrated so far in this run.
///
/// # Returns
///
/// `ResolvedEntity` on success. `Error::Mapping` if a required parent
/// reference is missing or points at an entity that was never migrated; a
/// foreign key never silently degrades to null.
///
pub fn resolve(entity: SourceEntity, mapper: &IdMapper) -> Result<ResolvedEntity> {
    let kind = entity.kind();
    let mut parents = BTreeMap::new();

    for &parent in kind.parents() {
        let Some(parent_source_id) = entity.parents.get(&parent) else {
            return Err(Error::Mapping(format!(
                "{} `{}` has no {} reference",
                kind, entity.source_id, parent
            )));
        };
        let Some(target_id) = mapper.lookup(parent, parent_source_id) else {
            return Err(Error::Mapping(format!(
                "{} `{}` references unmapped {} `{}`",
                kind, entity.source_id, parent, parent_source_id
            )));
        };
        parents.insert(parent, target_id);
    }

    Ok(ResolvedEntity {
        source_id: entity.source_id,
        payload: entity.payload,
        parents,
    })
}

/// Resolves a whole chunk, failing on the first unresolvable entity.
pub fn resolve_chunk(chunk: Vec<SourceEntity>, mapper: &IdMapper) -> Result<Vec<ResolvedEntity>> {
    chunk
        .into_iter()
        .map(|entity| resolve(entity, mapper))
        .collect()
}
