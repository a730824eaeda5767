mod failures;
mod postgres;
mod run;

// -----------------------------------------------------------------------------

mod helpers {
    use library_migration::prelude::*;
    use library_migration::store::memory::{MemoryJobRepository, MemorySource, MemoryTarget};
    use library_migration::store::{SourceStore, TargetStore};
    use std::sync::Arc;

    /// Library documents of the reference scenario: three authors, three
    /// genres, three books and six comments spread 3/2/1 over the books.
    ///
    pub fn library() -> Vec<SourceEntity> {
        vec![
            SourceEntity::author("a1", "Author_1"),
            SourceEntity::author("a2", "Author_2"),
            SourceEntity::author("a3", "Author_3"),
            SourceEntity::genre("g1", "Genre_1"),
            SourceEntity::genre("g2", "Genre_2"),
            SourceEntity::genre("g3", "Genre_3"),
            SourceEntity::book("b1", "BookTitle_1", "a3", "g2"),
            SourceEntity::book("b2", "BookTitle_2", "a1", "g3"),
            SourceEntity::book("b3", "BookTitle_3", "a2", "g1"),
            SourceEntity::comment("c1", "Comment_1", "b1"),
            SourceEntity::comment("c2", "Comment_2", "b1"),
            SourceEntity::comment("c3", "Comment_3", "b1"),
            SourceEntity::comment("c4", "Comment_4", "b2"),
            SourceEntity::comment("c5", "Comment_5", "b2"),
            SourceEntity::comment("c6", "Comment_6", "b3"),
        ]
    }

    /// Wires an `Orchestrator` to in-memory stores.
    ///
    pub struct TestJob {
        pub target: MemoryTarget,
        pub repository: Arc<MemoryJobRepository>,
        pub orchestrator: Orchestrator,
    }

    impl TestJob {
        pub fn new(source: impl SourceStore + 'static, chunk_size: usize) -> Self {
            Self::with_target(source, MemoryTarget::new(), chunk_size)
        }

        pub fn with_target(
            source: impl SourceStore + 'static,
            target: MemoryTarget,
            chunk_size: usize,
        ) -> Self {
            let settings = JobSettings {
                chunk_size,
                ..Default::default()
            };
            Self::configured(Arc::new(source), target, settings)
        }

        /// Runs against a shared `source` with explicit chunk and page sizes.
        pub fn configured(
            source: Arc<dyn SourceStore>,
            target: MemoryTarget,
            settings: JobSettings,
        ) -> Self {
            let repository = Arc::new(MemoryJobRepository::new());
            let orchestrator = Orchestrator::new(
                source,
                Arc::new(target.clone()),
                repository.clone(),
                settings,
            )
            .unwrap();

            Self {
                target,
                repository,
                orchestrator,
            }
        }

        pub fn library(chunk_size: usize) -> Self {
            Self::new(MemorySource::new().with(library()), chunk_size)
        }

        pub async fn rows(&self, kind: EntityKind) -> Vec<TargetEntity> {
            self.target.fetch_rows(kind).await.unwrap()
        }

        /// Text payloads of the `kind` table, in id order.
        pub async fn texts(&self, kind: EntityKind) -> Vec<String> {
            self.rows(kind)
                .await
                .into_iter()
                .map(|row| row.payload.text().to_owned())
                .collect()
        }
    }
}
