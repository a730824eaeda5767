//! Source store over JSON-lines collection exports.
//!
//! Each collection lives in `<root>/<collection>.jsonl`, one document per
//! line, as written by `mongoexport`. A page token is the byte offset of the
//! first unread line, so a page re-opens the file and seeks instead of
//! keeping it in memory.

use crate::etl::documents;
use crate::etl::types::{EntityKind, SourceEntity};
use crate::prelude::{Error, Result};
use crate::store::{Page, PageRequest, PageToken, SourceStore};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

#[derive(Debug, Clone)]
pub struct DocumentSource {
    root: PathBuf,
}

impl DocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the `kind` collection.
    pub fn collection_path(&self, kind: EntityKind) -> PathBuf {
        self.root.join(format!("{}.jsonl", kind.collection()))
    }
}

#[async_trait]
impl SourceStore for DocumentSource {
    async fn find_all(&self, kind: EntityKind, request: PageRequest) -> Result<Page<SourceEntity>> {
        let path = self.collection_path(kind);
        let file = File::open(&path)
            .await
            .map_err(|error| Error::Read(format!("cannot open {}: {}", path.display(), error)))?;
        let mut reader = BufReader::new(file);
        let mut offset = request.token.map_or(0, |PageToken(offset)| offset);
        reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(Error::read)?;

        let mut items = Vec::with_capacity(request.size);
        let mut line = String::new();
        let mut exhausted = false;
        while items.len() < request.size {
            line.clear();
            let read = reader.read_line(&mut line).await.map_err(Error::read)?;
            if read == 0 {
                exhausted = true;
                break;
            }
            offset += read as u64;

            let document = line.trim();
            if document.is_empty() {
                continue;
            }
            items.push(documents::decode(kind, document)?);
        }
        tracing::trace!(%kind, offset, fetched = items.len(), "Page read.");

        Ok(Page {
            items,
            next: (!exhausted).then_some(PageToken(offset)),
        })
    }
}
