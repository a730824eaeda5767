//! Per-kind decoding of source documents.
//!
//! The document store keeps every collection as loosely typed JSON. The
//! structs below describe the fields the migration needs from each
//! collection; anything else in a document is ignored. Parent references are
//! embedded sub-documents carrying at least the parent's `_id`. Ids are either
//! plain strings or extended JSON object ids (`{"$oid": "..."}`).

use crate::etl::types::{EntityKind, Payload, SourceEntity};
use crate::prelude::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Document `_id` as it appears in an export.
///
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Plain(String),
    ObjectId {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

impl DocumentId {
    pub fn as_str(&self) -> &str {
        match self {
            DocumentId::Plain(id) | DocumentId::ObjectId { oid: id } => id,
        }
    }
}

/// Reference to another document.
///
#[derive(Debug, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "_id")]
    pub id: DocumentId,
}

#[derive(Debug, Deserialize)]
pub struct AuthorDocument {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct GenreDocument {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BookDocument {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub title: String,
    pub author: Option<DocumentRef>,
    pub genre: Option<DocumentRef>,
}

#[derive(Debug, Deserialize)]
pub struct CommentDocument {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub text: String,
    pub book: Option<DocumentRef>,
}

impl From<AuthorDocument> for SourceEntity {
    fn from(document: AuthorDocument) -> Self {
        SourceEntity::new(
            document.id.as_str(),
            Payload::Author {
                full_name: document.full_name,
            },
        )
    }
}

impl From<GenreDocument> for SourceEntity {
    fn from(document: GenreDocument) -> Self {
        SourceEntity::new(document.id.as_str(), Payload::Genre { name: document.name })
    }
}

impl From<BookDocument> for SourceEntity {
    fn from(document: BookDocument) -> Self {
        let entity = SourceEntity::new(
            document.id.as_str(),
            Payload::Book {
                title: document.title,
            },
        );
        let entity = with_reference(entity, EntityKind::Author, document.author);
        with_reference(entity, EntityKind::Genre, document.genre)
    }
}

impl From<CommentDocument> for SourceEntity {
    fn from(document: CommentDocument) -> Self {
        let entity = SourceEntity::new(document.id.as_str(), Payload::Comment { text: document.text });
        with_reference(entity, EntityKind::Book, document.book)
    }
}

/// Absent references are left for the resolver to reject.
fn with_reference(
    entity: SourceEntity,
    kind: EntityKind,
    reference: Option<DocumentRef>,
) -> SourceEntity {
    match reference {
        Some(reference) => entity.with_parent(kind, reference.id.as_str()),
        None => entity,
    }
}

/// Decodes a single JSON document of the `kind` collection.
///
/// # Arguments
///
/// * `kind`: Collection the document was read from.
/// * `json`: Raw document text.
///
/// # Returns
///
/// Decoded `SourceEntity`, or `Error::Read` when the document does not have
/// the shape its collection requires.
///
pub fn decode(kind: EntityKind, json: &str) -> Result<SourceEntity> {
    match kind {
        EntityKind::Author => decode_as::<AuthorDocument>(kind, json),
        EntityKind::Genre => decode_as::<GenreDocument>(kind, json),
        EntityKind::Book => decode_as::<BookDocument>(kind, json),
        EntityKind::Comment => decode_as::<CommentDocument>(kind, json),
    }
}

fn decode_as<D>(kind: EntityKind, json: &str) -> Result<SourceEntity>
where
    D: DeserializeOwned + Into<SourceEntity>,
{
    serde_json::from_str::<D>(json)
        .map(Into::into)
        .map_err(|error| Error::Read(format!("malformed {} document: {}", kind, error)))
}
