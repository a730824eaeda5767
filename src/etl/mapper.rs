//! Per-run translation of source ids into target surrogate keys.
//!
//! The in-memory table is authoritative for resolution within a run. Its
//! durable mirror lives in the target store's staging tables and is written
//! inside the same transaction as the chunk it belongs to; the in-memory side
//! is only extended once that transaction committed.

use crate::etl::types::{EntityKind, IdMapping};
use crate::prelude::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct IdMapper {
    entries: HashMap<EntityKind, HashMap<String, i64>>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the target id of a migrated entity, if any.
    pub fn lookup(&self, kind: EntityKind, source_id: &str) -> Option<i64> {
        self.entries
            .get(&kind)
            .and_then(|ids| ids.get(source_id))
            .copied()
    }

    pub fn contains(&self, kind: EntityKind, source_id: &str) -> bool {
        self.lookup(kind, source_id).is_some()
    }

    /// Number of mapped entities of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.get(&kind).map_or(0, HashMap::len)
    }

    /// Checks that none of `source_ids` was mapped already, nor appears twice.
    ///
    /// # Arguments
    ///
    /// * `kind`: Kind the ids belong to.
    /// * `source_ids`: Ids about to be written as one chunk.
    ///
    /// # Returns
    ///
    /// Empty `Ok(())` if all ids are new, `Error::Write` otherwise.
    ///
    pub fn ensure_unmapped<'a>(
        &self,
        kind: EntityKind,
        source_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source_id in source_ids {
            if self.contains(kind, source_id) || !seen.insert(source_id) {
                return Err(Error::Write(format!(
                    "duplicate {} source id `{}`",
                    kind, source_id
                )));
            }
        }
        Ok(())
    }

    /// Publishes the mappings of a committed chunk.
    ///
    /// Mappings are write-once: an id already present keeps its first target
    /// id. Callers check with [`ensure_unmapped`](Self::ensure_unmapped)
    /// before the chunk is written.
    ///
    pub fn apply(&mut self, mappings: Vec<IdMapping>) {
        for mapping in mappings {
            self.entries
                .entry(mapping.kind)
                .or_default()
                .entry(mapping.source_id)
                .or_insert(mapping.target_id);
        }
    }

    /// Forgets every mapping.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
