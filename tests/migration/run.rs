use crate::helpers::{TestJob, library};
use library_migration::etl::job::StepStatus;
use library_migration::etl::types::Payload;
use library_migration::prelude::*;
use library_migration::store::memory::{MemorySource, MemoryTarget};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn library_is_migrated_with_resolved_references() {
    // Arrange
    let mut job = TestJob::library(5);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.error.is_none());
    let books = job
        .rows(EntityKind::Book)
        .await
        .into_iter()
        .map(|book| {
            (
                book.target_id,
                book.payload.text().to_owned(),
                book.parent(EntityKind::Author),
                book.parent(EntityKind::Genre),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        books,
        [
            (1, "BookTitle_1".to_owned(), Some(3), Some(2)),
            (2, "BookTitle_2".to_owned(), Some(1), Some(3)),
            (3, "BookTitle_3".to_owned(), Some(2), Some(1)),
        ]
    );
    let comment_books = job
        .rows(EntityKind::Comment)
        .await
        .into_iter()
        .map(|comment| comment.parent(EntityKind::Book))
        .collect::<Vec<_>>();
    assert_eq!(
        comment_books,
        [Some(1), Some(1), Some(1), Some(2), Some(2), Some(3)]
    );
}

#[tokio::test]
async fn counts_are_preserved() {
    let mut job = TestJob::library(2);

    let statistic = job.orchestrator.run().await.into_result().unwrap();

    assert_eq!(
        statistic,
        BTreeMap::from([
            (EntityKind::Author, 3),
            (EntityKind::Genre, 3),
            (EntityKind::Book, 3),
            (EntityKind::Comment, 6),
        ])
    );
    for (kind, expected) in statistic {
        assert_eq!(job.target.row_count(kind).await as u64, expected);
        assert_eq!(job.orchestrator.mapper().count(kind) as u64, expected);
    }
}

#[tokio::test]
async fn every_reference_points_at_a_migrated_row() {
    let mut job = TestJob::library(5);

    job.orchestrator.run().await.into_result().unwrap();

    for kind in EntityKind::ALL {
        for row in job.rows(kind).await {
            for (&parent, &parent_id) in &row.parents {
                let parents = job.rows(parent).await;
                assert!(
                    parents.iter().any(|candidate| candidate.target_id == parent_id),
                    "{row} references a missing {parent}"
                );
            }
        }
    }
}

#[tokio::test]
async fn chunk_size_only_affects_commit_granularity() {
    // Arrange
    let mut single = TestJob::library(1);
    let mut batched = TestJob::library(5);

    // Act
    single.orchestrator.run().await.into_result().unwrap();
    batched.orchestrator.run().await.into_result().unwrap();

    // Assert
    for kind in EntityKind::ALL {
        assert_eq!(single.rows(kind).await, batched.rows(kind).await);
    }
}

#[tokio::test]
async fn page_size_is_independent_of_chunk_size() {
    // Arrange
    let mut single_page = TestJob::library(5);
    single_page.orchestrator.run().await.into_result().unwrap();

    for chunk_size in [5, 1] {
        let source = Arc::new(MemorySource::new().with(library()));
        let settings = JobSettings {
            chunk_size,
            page_size: 2,
        };
        let mut paged = TestJob::configured(source.clone(), MemoryTarget::new(), settings);

        // Act
        let result = paged.orchestrator.run().await;

        // Assert
        assert!(result.is_completed(), "{result}");
        assert!(source.pages_served() > EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            assert_eq!(paged.rows(kind).await, single_page.rows(kind).await);
        }
    }
}

#[tokio::test]
async fn rerun_reproduces_the_same_target() {
    // Arrange
    let mut job = TestJob::library(3);
    job.orchestrator.run().await.into_result().unwrap();
    let mut first = BTreeMap::new();
    for kind in EntityKind::ALL {
        first.insert(kind, job.rows(kind).await);
    }

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    assert!(result.is_completed());
    for kind in EntityKind::ALL {
        assert_eq!(job.rows(kind).await, first[&kind]);
    }
}

#[tokio::test]
async fn stale_target_rows_are_truncated() {
    let target = MemoryTarget::new();
    target
        .seed([TargetEntity {
            target_id: 99,
            payload: Payload::Author {
                full_name: "Leftover".to_owned(),
            },
            parents: BTreeMap::new(),
        }])
        .await;
    let mut job = TestJob::with_target(MemorySource::new().with(library()), target, 5);

    job.orchestrator.run().await.into_result().unwrap();

    assert_eq!(
        job.texts(EntityKind::Author).await,
        ["Author_1", "Author_2", "Author_3"]
    );
}

#[tokio::test]
async fn staging_objects_are_dropped_after_completion() {
    let mut job = TestJob::library(5);

    job.orchestrator.run().await.into_result().unwrap();

    for kind in EntityKind::ALL {
        assert!(!job.target.has_staging_table(kind).await);
        assert!(!job.target.has_sequence(kind).await);
    }
}

#[tokio::test]
async fn empty_source_completes_with_zero_counts() {
    let mut job = TestJob::new(MemorySource::new(), 5);

    let statistic = job.orchestrator.run().await.into_result().unwrap();

    assert!(statistic.values().all(|&migrated| migrated == 0));
    assert_eq!(job.target.row_count(EntityKind::Comment).await, 0);
}

#[tokio::test]
async fn run_and_steps_are_recorded() {
    // Arrange
    let mut job = TestJob::library(5);

    // Act
    let result = job.orchestrator.run().await;

    // Assert
    let runs = job.repository.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, result.run_id);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert!(runs[0].ended_at.is_some());

    let steps = job.repository.steps(result.run_id).await;
    assert_eq!(
        steps.iter().map(|execution| execution.step).collect::<Vec<_>>(),
        Step::plan()
    );
    assert!(
        steps
            .iter()
            .all(|execution| execution.status == StepStatus::Completed)
    );
    let migrated_comments = steps
        .iter()
        .find(|execution| execution.step == Step::Migrate(EntityKind::Comment))
        .map(|execution| execution.migrated);
    assert_eq!(migrated_comments, Some(6));
}
