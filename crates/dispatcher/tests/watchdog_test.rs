use std::sync::Arc;
use std::time::Duration as StdDuration;

use aijob_dispatcher::{StuckJobWatchdog, WatchdogConfig};
use aijob_domain::JobStatus;
use aijob_testing_utils::{JobBuilder, MockJobRepository};
use chrono::{Duration, Utc};

#[tokio::test]
async fn test_recover_resets_only_stuck_bulk_jobs() {
    let now = Utc::now();
    let repo = MockJobRepository::with_jobs(vec![
        JobBuilder::new()
            .with_id(1)
            .with_status(JobStatus::Processing)
            .with_started_at(now - Duration::days(2))
            .with_progress(2, 0)
            .build(),
        JobBuilder::new()
            .with_id(2)
            .with_status(JobStatus::Processing)
            .with_started_at(now - Duration::hours(1))
            .build(),
        JobBuilder::new()
            .with_id(3)
            .learning()
            .with_status(JobStatus::Processing)
            .with_started_at(now - Duration::days(3))
            .build(),
        JobBuilder::new()
            .with_id(4)
            .with_status(JobStatus::Pending)
            .with_started_at(now - Duration::days(5))
            .build(),
    ]);
    let watchdog = StuckJobWatchdog::new(Arc::new(repo.clone()), None);

    let recovered = watchdog.recover_stuck_jobs().await.unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].id, 1);

    let reset = repo.job(1).unwrap();
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.processed_units, 2);
    assert!(reset.error_message.unwrap().contains("看门狗"));

    assert_eq!(repo.job(2).unwrap().status, JobStatus::Processing);
    assert_eq!(repo.job(3).unwrap().status, JobStatus::Processing);
}

#[tokio::test]
async fn test_recover_honours_configured_threshold() {
    let repo = MockJobRepository::with_jobs(vec![JobBuilder::new()
        .with_id(1)
        .with_status(JobStatus::Processing)
        .with_started_at(Utc::now() - Duration::minutes(10))
        .build()]);
    let watchdog = StuckJobWatchdog::new(
        Arc::new(repo.clone()),
        Some(WatchdogConfig {
            stuck_job_after: StdDuration::from_secs(300),
        }),
    );

    let recovered = watchdog.recover_stuck_jobs().await.unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(repo.job(1).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_recover_with_nothing_stuck_is_noop() {
    let repo = MockJobRepository::new();
    let watchdog = StuckJobWatchdog::new(Arc::new(repo), None);

    assert!(watchdog.recover_stuck_jobs().await.unwrap().is_empty());
}
