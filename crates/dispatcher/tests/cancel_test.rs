mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use aijob_core::OrchestratorError;
use aijob_dispatcher::CancelOutcome;
use aijob_domain::JobStatus;
use aijob_testing_utils::{annotation, JobBuilder, TestEnv};
use chrono::{Duration, Utc};

use common::Harness;

#[tokio::test]
async fn test_cancel_aborts_monitor_and_starts_next_job() {
    let h = Harness::new(10);
    h.records
        .add_annotation(annotation(1, 5, 1, 1, Utc::now() - Duration::minutes(1)));
    h.remote.hold();

    let sync = h.orchestrator.request_taxonomy_sync(1).await.unwrap();
    let learning = h.orchestrator.request_learning(1).await.unwrap();
    assert_eq!(sync.status, JobStatus::Processing);
    assert_eq!(learning.status, JobStatus::Pending);
    assert!(h.orchestrator.monitors().is_monitoring(sync.id));

    let outcome = h.orchestrator.cancel(sync.id).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert!(!h.orchestrator.monitors().is_monitoring(sync.id));
    let cancelled = h.jobs.job(sync.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert_eq!(
        h.taxonomies.taxonomy(1).unwrap().sync_state.unwrap().status,
        JobStatus::Cancelled
    );

    assert_eq!(h.jobs.job(learning.id).unwrap().status, JobStatus::Processing);
    h.remote.release();
    assert!(h.wait_for_status(learning.id, JobStatus::Completed).await);
}

#[tokio::test]
async fn test_cancel_pending_job_leaves_queue_untouched() {
    let h = Harness::new(10);
    h.jobs.insert(
        JobBuilder::new()
            .with_id(1)
            .taxonomy_sync()
            .with_status(JobStatus::Processing)
            .build(),
    );
    h.jobs.insert(JobBuilder::new().with_id(2).learning().build());

    let outcome = h.orchestrator.cancel(2).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert_eq!(h.jobs.job(1).unwrap().status, JobStatus::Processing);
    assert_eq!(h.jobs.job(2).unwrap().status, JobStatus::Cancelled);
    assert_eq!(h.remote.submit_count(), 0);
}

#[tokio::test]
async fn test_cancel_succeeds_when_next_job_fails_to_start() {
    let h = Harness::new(10);
    h.jobs.insert(
        JobBuilder::new()
            .with_id(1)
            .taxonomy_sync()
            .with_status(JobStatus::Processing)
            .with_external_job_id("ext-running")
            .build(),
    );
    h.jobs.insert(JobBuilder::new().with_id(2).learning().build());
    h.jobs
        .fail_next_claim_with(OrchestratorError::Internal("连接池耗尽".to_string()));

    let outcome = h.orchestrator.cancel(1).await.unwrap();

    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert_eq!(h.jobs.job(1).unwrap().status, JobStatus::Cancelled);
    assert_eq!(h.jobs.job(2).unwrap().status, JobStatus::Pending);
    assert_eq!(h.remote.submit_count(), 0);
}

#[tokio::test]
async fn test_cancel_finished_job_reports_existing_status() {
    let h = Harness::new(10);
    h.jobs.insert(
        JobBuilder::new()
            .with_id(1)
            .with_status(JobStatus::Completed)
            .build(),
    );

    let outcome = h.orchestrator.cancel(1).await.unwrap();

    assert_eq!(outcome, CancelOutcome::AlreadyFinished(JobStatus::Completed));
    assert_eq!(h.jobs.job(1).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_unknown_job_is_not_found() {
    let h = Harness::new(10);

    let err = h.orchestrator.cancel(404).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::JobNotFound { id: 404 }));
}

#[tokio::test]
async fn test_cancelled_bulk_job_is_stopped_by_runner() {
    let h = Harness::new(10);
    h.seed_records(1..=30);
    let jobs = h.jobs.clone();
    let remote = h.remote.clone();
    h.remote.on_submit(Arc::new(move |n, _, _| {
        if n == 1 {
            remote.hold();
        }
    }));

    let (job, _) = h
        .orchestrator
        .submit_bulk_labeling(1, (1..=30).collect())
        .await
        .unwrap();
    let submitted = h.remote.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let started = submitted.submit_count() == 1;
                async move { started }
            },
            StdDuration::from_secs(5),
        )
        .await
    );
    assert_eq!(
        h.orchestrator.cancel(job.id).await.unwrap(),
        CancelOutcome::Cancelled
    );
    h.remote.release();

    assert!(h.wait_until_runner_idle().await);
    let cancelled = jobs.job(job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.processed_units <= 10);
    assert_eq!(h.remote.submit_count(), 1);
}
