use crate::helpers::{TestJob, library};
use library_migration::etl::job::StepStatus;
use library_migration::etl::schema::Ddl;
use library_migration::prelude::*;
use library_migration::store::memory::{MemorySource, MemoryTarget};

fn library_without_comments() -> impl Iterator<Item = SourceEntity> {
    library()
        .into_iter()
        .filter(|entity| entity.kind() != EntityKind::Comment)
}

#[tokio::test]
async fn unmapped_parent_fails_the_chunk_and_keeps_earlier_chunks() {
    // Arrange
    let source = MemorySource::new()
        .with(library_without_comments())
        .with([
            SourceEntity::comment("c1", "Comment_1", "b1"),
            SourceEntity::comment("c2", "Comment_2", "b1"),
            SourceEntity::comment("c3", "Orphan", "b404"),
            SourceEntity::comment("c4", "Comment_4", "b2"),
        ]);
    let mut job = TestJob::new(source, 2);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_phase, Some(Step::Migrate(EntityKind::Comment)));
    assert!(matches!(result.error, Some(Error::Mapping(_))));
    assert_eq!(
        job.texts(EntityKind::Comment).await,
        ["Comment_1", "Comment_2"]
    );
    assert_eq!(job.orchestrator.mapper().count(EntityKind::Comment), 2);
    assert_eq!(job.target.staged_mappings(EntityKind::Comment).await.len(), 2);
}

#[tokio::test]
async fn book_referencing_missing_author_is_a_mapping_error() {
    let source = MemorySource::new().with([
        SourceEntity::genre("g1", "Genre_1"),
        SourceEntity::book("b1", "BookTitle_1", "a404", "g1"),
    ]);
    let mut job = TestJob::new(source, 5);

    let result = job.orchestrator.run().await;

    assert_eq!(result.failed_phase, Some(Step::Migrate(EntityKind::Book)));
    assert!(matches!(result.error, Some(Error::Mapping(_))));
    assert_eq!(job.target.row_count(EntityKind::Book).await, 0);
}

#[tokio::test]
async fn failed_insert_rolls_back_the_whole_chunk() {
    // Arrange
    let target = MemoryTarget::new();
    target.fail_insert(EntityKind::Book, 1).await;
    let mut job = TestJob::with_target(MemorySource::new().with(library()), target, 2);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert_eq!(result.failed_phase, Some(Step::Migrate(EntityKind::Book)));
    assert!(matches!(result.error, Some(Error::Write(_))));
    assert_eq!(
        job.texts(EntityKind::Book).await,
        ["BookTitle_1", "BookTitle_2"]
    );
    let staged = job.target.staged_mappings(EntityKind::Book).await;
    assert_eq!(staged.len(), 2);
    assert!(!staged.contains_key("b3"));
    assert!(!job.orchestrator.mapper().contains(EntityKind::Book, "b3"));
    assert_eq!(job.target.row_count(EntityKind::Comment).await, 0);
}

#[tokio::test]
async fn duplicate_source_id_is_a_write_error() {
    let source = MemorySource::new().with([
        SourceEntity::author("a1", "Author_1"),
        SourceEntity::author("a1", "Author_1_again"),
    ]);
    let mut job = TestJob::new(source, 5);

    let result = job.orchestrator.run().await;

    assert_eq!(result.failed_phase, Some(Step::Migrate(EntityKind::Author)));
    assert!(matches!(result.error, Some(Error::Write(_))));
    assert_eq!(job.target.row_count(EntityKind::Author).await, 0);
}

#[tokio::test]
async fn refused_ddl_fails_the_run_before_migration() {
    // Arrange
    let target = MemoryTarget::new();
    target
        .fail_ddl(Ddl::CreateSequence(EntityKind::Genre))
        .await;
    let mut job = TestJob::with_target(MemorySource::new().with(library()), target, 5);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert_eq!(
        result.failed_phase,
        Some(Step::CreateSequence(EntityKind::Genre))
    );
    assert!(matches!(result.error, Some(Error::SchemaPreparation(_))));
    assert_eq!(job.target.row_count(EntityKind::Author).await, 0);

    let runs = job.repository.runs().await;
    assert_eq!(runs[0].status, RunStatus::Failed);
    let steps = job.repository.steps(result.run_id).await;
    let last = steps.last().unwrap();
    assert_eq!(last.step, Step::CreateSequence(EntityKind::Genre));
    assert_eq!(last.status, StepStatus::Failed);
}

#[tokio::test]
async fn unreadable_collection_fails_its_step() {
    let mut source = MemorySource::new().with(library());
    source.fail_reads(EntityKind::Book);
    let mut job = TestJob::new(source, 5);

    let result = job.orchestrator.run().await;

    assert_eq!(result.failed_phase, Some(Step::Migrate(EntityKind::Book)));
    assert!(matches!(result.error, Some(Error::Read(_))));
    assert_eq!(job.target.row_count(EntityKind::Author).await, 3);
    assert_eq!(job.target.row_count(EntityKind::Book).await, 0);
}

#[tokio::test]
async fn failed_run_leaves_staging_objects_behind() {
    let mut source = MemorySource::new().with(library());
    source.fail_reads(EntityKind::Comment);
    let mut job = TestJob::new(source, 5);

    let result = job.orchestrator.run().await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(job.target.has_staging_table(EntityKind::Author).await);
    assert!(job.target.has_sequence(EntityKind::Comment).await);
}

#[tokio::test]
async fn zero_chunk_size_is_not_supported() {
    let result = Orchestrator::new(
        std::sync::Arc::new(MemorySource::new()),
        std::sync::Arc::new(MemoryTarget::new()),
        std::sync::Arc::new(library_migration::store::memory::MemoryJobRepository::new()),
        JobSettings {
            chunk_size: 0,
            page_size: 10,
        },
    );

    assert!(matches!(result, Err(Error::NotSupported(_))));
}

#[tokio::test]
async fn refused_truncate_fails_the_run_before_any_staging() {
    // Arrange
    let target = MemoryTarget::new();
    target.fail_truncate(EntityKind::Book).await;
    let mut job = TestJob::with_target(MemorySource::new().with(library()), target, 5);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_phase, Some(Step::Truncate));
    assert!(matches!(result.error, Some(Error::Write(_))));

    let runs = job.repository.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].current_phase, Some(Step::Truncate));

    for kind in EntityKind::ALL {
        assert!(!job.target.has_staging_table(kind).await);
        assert!(!job.target.has_sequence(kind).await);
        assert_eq!(job.target.row_count(kind).await, 0);
    }
}
