//! Data carried through the migration pipeline.
//!
//! Entities travel in three shapes: [`SourceEntity`] as read from the
//! document store, [`ResolvedEntity`] once its parent references point at
//! target keys, and [`TargetEntity`] once the target store assigned its own
//! surrogate key. None of them carry behavior beyond data access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type discriminator of migrated entities.
///
/// The declaration order is also a valid migration order: every kind comes
/// after all of its [`parents`](EntityKind::parents).
///
#[derive(
    Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Author,
    Genre,
    Book,
    Comment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Author,
        EntityKind::Genre,
        EntityKind::Book,
        EntityKind::Comment,
    ];

    /// Kinds whose ids must be mapped before this kind can be resolved.
    pub fn parents(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Author | EntityKind::Genre => &[],
            EntityKind::Book => &[EntityKind::Author, EntityKind::Genre],
            EntityKind::Comment => &[EntityKind::Book],
        }
    }

    /// Lowercase singular name, used in staging object names.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Author => "author",
            EntityKind::Genre => "genre",
            EntityKind::Book => "book",
            EntityKind::Comment => "comment",
        }
    }

    /// Name of the final target table.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Author => "authors",
            EntityKind::Genre => "genres",
            EntityKind::Book => "books",
            EntityKind::Comment => "comments",
        }
    }

    /// Name of the source collection.
    pub fn collection(self) -> &'static str {
        self.table()
    }

    /// Order in which target tables can be emptied without breaking foreign
    /// keys: children first.
    pub fn truncate_order() -> [EntityKind; 4] {
        [
            EntityKind::Comment,
            EntityKind::Book,
            EntityKind::Author,
            EntityKind::Genre,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Own fields of an entity, one variant per [`EntityKind`].
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Author { full_name: String },
    Genre { name: String },
    Book { title: String },
    Comment { text: String },
}

impl Payload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Payload::Author { .. } => EntityKind::Author,
            Payload::Genre { .. } => EntityKind::Genre,
            Payload::Book { .. } => EntityKind::Book,
            Payload::Comment { .. } => EntityKind::Comment,
        }
    }

    /// The single text column every kind carries.
    pub fn text(&self) -> &str {
        match self {
            Payload::Author { full_name } => full_name,
            Payload::Genre { name } => name,
            Payload::Book { title } => title,
            Payload::Comment { text } => text,
        }
    }

    /// Builds the payload of `kind` from its text column.
    pub fn from_text(kind: EntityKind, text: impl Into<String>) -> Self {
        let text = text.into();
        match kind {
            EntityKind::Author => Payload::Author { full_name: text },
            EntityKind::Genre => Payload::Genre { name: text },
            EntityKind::Book => Payload::Book { title: text },
            EntityKind::Comment => Payload::Comment { text },
        }
    }
}

/// Entity as produced by the source store.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntity {
    pub source_id: String,
    pub payload: Payload,
    pub parents: BTreeMap<EntityKind, String>,
}

impl SourceEntity {
    pub fn new(source_id: &str, payload: Payload) -> Self {
        Self {
            source_id: source_id.to_owned(),
            payload,
            parents: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, kind: EntityKind, source_id: &str) -> Self {
        self.parents.insert(kind, source_id.to_owned());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn author(id: &str, full_name: &str) -> Self {
        Self::new(
            id,
            Payload::Author {
                full_name: full_name.to_owned(),
            },
        )
    }

    pub fn genre(id: &str, name: &str) -> Self {
        Self::new(
            id,
            Payload::Genre {
                name: name.to_owned(),
            },
        )
    }

    pub fn book(id: &str, title: &str, author_id: &str, genre_id: &str) -> Self {
        Self::new(
            id,
            Payload::Book {
                title: title.to_owned(),
            },
        )
        .with_parent(EntityKind::Author, author_id)
        .with_parent(EntityKind::Genre, genre_id)
    }

    pub fn comment(id: &str, text: &str, book_id: &str) -> Self {
        Self::new(
            id,
            Payload::Comment {
                text: text.to_owned(),
            },
        )
        .with_parent(EntityKind::Book, book_id)
    }
}

/// Entity whose parent references already point at target keys, waiting for
/// its own surrogate key.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub source_id: String,
    pub payload: Payload,
    pub parents: BTreeMap<EntityKind, i64>,
}

impl ResolvedEntity {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn parent(&self, kind: EntityKind) -> Option<i64> {
        self.parents.get(&kind).copied()
    }

    /// Attaches the surrogate key assigned by the target store.
    pub fn into_target(self, target_id: i64) -> TargetEntity {
        TargetEntity {
            target_id,
            payload: self.payload,
            parents: self.parents,
        }
    }
}

/// Entity as persisted in the target store.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEntity {
    pub target_id: i64,
    pub payload: Payload,
    pub parents: BTreeMap<EntityKind, i64>,
}

impl TargetEntity {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn parent(&self, kind: EntityKind) -> Option<i64> {
        self.parents.get(&kind).copied()
    }
}

impl std::fmt::Display for TargetEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(id={}, {:?}", self.kind(), self.target_id, self.payload.text())?;
        for (kind, id) in &self.parents {
            write!(f, ", {}_id={}", kind, id)?;
        }
        f.write_str(")")
    }
}

/// One row of the per-run translation table.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapping {
    pub kind: EntityKind,
    pub source_id: String,
    pub target_id: i64,
}
