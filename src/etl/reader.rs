//! Forward-only cursor over one source collection.

use crate::etl::types::{EntityKind, SourceEntity};
use crate::prelude::{Error, Result};
use crate::store::{PageRequest, PageToken, SourceStore};
use futures::stream::{self, Stream, TryStreamExt};

/// Paged reader of a single collection.
///
/// Only one page is held in memory at a time. Pages are fetched lazily as
/// the stream is polled, and every entity is yielded exactly once, in the
/// store's order.
///
pub struct EntityReader<'a> {
    source: &'a dyn SourceStore,
    kind: EntityKind,
    page_size: usize,
}

enum Cursor {
    Start,
    At(PageToken),
    Exhausted,
}

impl<'a> EntityReader<'a> {
    pub fn new(source: &'a dyn SourceStore, kind: EntityKind, page_size: usize) -> Self {
        Self {
            source,
            kind,
            page_size,
        }
    }

    /// Turns the reader into a stream of entities.
    pub fn into_stream(self) -> impl Stream<Item = Result<SourceEntity>> + Send + 'a {
        let Self {
            source,
            kind,
            page_size,
        } = self;

        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let token = match cursor {
                Cursor::Start => None,
                Cursor::At(token) => Some(token),
                Cursor::Exhausted => return Ok(None),
            };
            let page = source
                .find_all(kind, PageRequest { token, size: page_size })
                .await?;
            tracing::trace!(%kind, size = %page.items.len(), "Source page fetched.");

            let next = match page.next {
                Some(token) if !page.items.is_empty() => Cursor::At(token),
                _ => Cursor::Exhausted,
            };
            let items = page.items.into_iter().map(Ok::<SourceEntity, Error>);
            Ok::<_, Error>(Some((stream::iter(items), next)))
        })
        .try_flatten()
    }
}
