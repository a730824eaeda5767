use crate::helpers::library;
use library_migration::prelude::*;
use library_migration::store::TargetStore;
use library_migration::store::memory::MemorySource;
use library_migration::store::postgres::{PgJobRepository, PgTarget};
use sqlx::PgPool;
use std::sync::Arc;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
async fn library_is_migrated_into_postgres(pool: PgPool) {
    // Arrange
    let target = PgTarget::from_pool(pool.clone());
    let mut orchestrator = Orchestrator::new(
        Arc::new(MemorySource::new().with(library())),
        Arc::new(target.clone()),
        Arc::new(PgJobRepository::new(pool.clone())),
        JobSettings::default(),
    )
    .unwrap();

    // Act
    let first = orchestrator.run().await;
    let second = orchestrator.run().await;

    // Assert
    assert!(first.is_completed(), "{first}");
    assert!(second.is_completed(), "{second}");
    let books = target.fetch_rows(EntityKind::Book).await.unwrap();
    assert_eq!(books.len(), 3);
    assert_eq!(books[0].payload.text(), "BookTitle_1");
    assert_eq!(books[0].parent(EntityKind::Author), Some(3));
    assert_eq!(books[0].parent(EntityKind::Genre), Some(2));
    assert_eq!(target.fetch_rows(EntityKind::Comment).await.unwrap().len(), 6);

    let (completed,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM migration_job_execution WHERE status = 'COMPLETED'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(completed, 2);
}
