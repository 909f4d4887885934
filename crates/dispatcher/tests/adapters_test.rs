mod common;

use std::time::Duration as StdDuration;

use aijob_core::OrchestratorError;
use aijob_domain::{JobKind, JobStatus};
use aijob_testing_utils::{annotation, JobBuilder, TaxonomyBuilder, TestEnv};
use chrono::{Duration, Utc};
use serde_json::json;

use common::{Harness, LEARNING_PATH, SYNC_PATH, TRAINING_PATH};

#[tokio::test]
async fn test_sync_request_starts_immediately_when_idle() {
    let h = Harness::new(10);

    let job = h.orchestrator.request_taxonomy_sync(1).await.unwrap();
    assert_eq!(job.kind, JobKind::TaxonomySync);
    assert!(h.wait_for_status(job.id, JobStatus::Completed).await);

    let body = &h.remote.submissions_to(SYNC_PATH)[0];
    assert_eq!(body["taxonomy_name"], "测试分类体系");
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(body["nodes"][1]["parent_id"], 1);

    let cache = h.taxonomies.taxonomy(1).unwrap().sync_state.unwrap();
    assert_eq!(cache.job_id, job.id);
    assert_eq!(cache.status, JobStatus::Completed);
    assert_eq!(h.jobs.job(job.id).unwrap().external_job_id.as_deref(), Some("ext-1"));
}

#[tokio::test]
async fn test_back_to_back_sync_requests_queue_second() {
    let h = Harness::new(10);
    h.remote.hold();

    let first = h.orchestrator.request_taxonomy_sync(1).await.unwrap();
    let second = h.orchestrator.request_taxonomy_sync(1).await.unwrap();

    assert_eq!(first.status, JobStatus::Processing);
    assert_eq!(second.status, JobStatus::Pending);
    let cache = h.taxonomies.taxonomy(1).unwrap().sync_state.unwrap();
    assert_eq!(cache.job_id, second.id);
    assert_eq!(cache.status, JobStatus::Pending);
    assert_eq!(h.remote.submit_count(), 1);

    h.remote.release();
    assert!(h.wait_for_status(second.id, JobStatus::Completed).await);

    let first = h.jobs.job(first.id).unwrap();
    let second = h.jobs.job(second.id).unwrap();
    assert_eq!(first.status, JobStatus::Completed);
    assert!(first.completed_at.unwrap() <= second.started_at);
    assert_eq!(h.remote.submit_count(), 2);

    let cache = h.taxonomies.taxonomy(1).unwrap().sync_state.unwrap();
    assert_eq!(cache.job_id, second.id);
    assert_eq!(cache.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_learning_advances_last_learned_at() {
    let h = Harness::new(10);
    let earlier = Utc::now() - Duration::minutes(10);
    h.records.add_annotation(annotation(1, 7, 1, 1, earlier));
    h.records.add_annotation(annotation(2, 7, 1, 2, earlier));
    h.records.add_annotation(annotation(3, 9, 1, 2, earlier));

    let job = h.orchestrator.request_learning(1).await.unwrap();
    assert!(h.wait_for_status(job.id, JobStatus::Completed).await);

    let body = &h.remote.submissions_to(LEARNING_PATH)[0];
    assert_eq!(body["records"].as_array().unwrap().len(), 2);
    assert_eq!(body["records"][0]["record_id"], 7);
    assert_eq!(
        body["records"][0]["labels"],
        json!([{"node_id": 1, "label": "节点1"}, {"node_id": 2, "label": "节点2"}])
    );

    let taxonomy = h.taxonomies.taxonomy(1).unwrap();
    assert!(taxonomy.last_learned_at.unwrap() > earlier);
    assert_eq!(taxonomy.learning_state.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_learning_only_sends_annotations_after_last_learned_at() {
    let h = Harness::new(10);
    let learned_at = Utc::now() - Duration::hours(1);
    h.taxonomies.insert(
        TaxonomyBuilder::new()
            .with_last_learned_at(learned_at)
            .build(),
    );
    h.records
        .add_annotation(annotation(1, 3, 1, 1, learned_at - Duration::minutes(5)));
    h.records
        .add_annotation(annotation(2, 4, 1, 1, learned_at + Duration::minutes(5)));

    let job = h.orchestrator.request_learning(1).await.unwrap();
    assert!(h.wait_for_status(job.id, JobStatus::Completed).await);

    let body = &h.remote.submissions_to(LEARNING_PATH)[0];
    assert_eq!(body["records"], json!([{"record_id": 4, "labels": [{"node_id": 1, "label": "节点1"}]}]));
}

#[tokio::test]
async fn test_learning_without_new_annotations_fails() {
    let h = Harness::new(10);

    let err = h.orchestrator.request_learning(1).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Data(_)));
    let jobs = h.jobs.all_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].error_message.as_deref().unwrap().contains("没有新的人工标注"));
    assert_eq!(h.remote.submit_count(), 0);

    let cache = h.taxonomies.taxonomy(1).unwrap().learning_state.unwrap();
    assert_eq!(cache.status, JobStatus::Failed);
    assert!(h.taxonomies.taxonomy(1).unwrap().last_learned_at.is_none());
}

#[tokio::test]
async fn test_training_submits_file_reference() {
    let h = Harness::new(10);

    let job = h
        .orchestrator
        .request_external_training(1, "uploads/train-2024.jsonl".to_string())
        .await
        .unwrap();
    assert!(h.wait_for_status(job.id, JobStatus::Completed).await);

    let body = &h.remote.submissions_to(TRAINING_PATH)[0];
    assert_eq!(body["training_file"], "uploads/train-2024.jsonl");
    assert_eq!(body["taxonomy_id"], 1);
}

#[tokio::test]
async fn test_remote_failure_marks_job_failed() {
    let h = Harness::new(10);
    h.remote.fail_jobs_with("GPU 资源不足");

    let job = h
        .orchestrator
        .request_external_training(1, "train.jsonl".to_string())
        .await
        .unwrap();
    assert!(h.wait_for_status(job.id, JobStatus::Failed).await);

    let failed = h.jobs.job(job.id).unwrap();
    assert!(failed.error_message.unwrap().contains("GPU 资源不足"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn test_submit_error_is_returned_to_caller() {
    let h = Harness::new(10);
    h.remote
        .fail_next_submit_with(OrchestratorError::configuration("外部AI服务地址或API密钥未配置"));

    let err = h.orchestrator.request_taxonomy_sync(1).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Configuration(_)));
    let job = &h.jobs.all_jobs()[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        h.taxonomies.taxonomy(1).unwrap().sync_state.unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_failed_start_hands_off_to_queued_job() {
    let h = Harness::new(10);
    h.jobs.insert(
        JobBuilder::new()
            .with_id(1)
            .taxonomy_sync()
            .with_started_at(Utc::now() - Duration::minutes(5))
            .build(),
    );

    // 队列中已有待处理任务，训练请求直接排队
    let training = h
        .orchestrator
        .request_external_training(1, "  ".to_string())
        .await
        .unwrap();
    assert_eq!(training.status, JobStatus::Pending);

    assert_eq!(h.orchestrator.coordinator().process_next_queued().await.unwrap(), Some(1));
    assert!(h.wait_for_status(training.id, JobStatus::Failed).await);
    assert!(h.wait_for_status(1, JobStatus::Completed).await);
    assert!(h
        .jobs
        .job(training.id)
        .unwrap()
        .error_message
        .unwrap()
        .contains("未指定训练文件"));
}

#[tokio::test]
async fn test_inactive_taxonomy_is_rejected_before_job_creation() {
    let h = Harness::new(10);
    h.taxonomies.insert(TaxonomyBuilder::new().with_id(2).inactive().build());

    let err = h.orchestrator.request_taxonomy_sync(2).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Data(_)));

    let err = h.orchestrator.request_learning(42).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::TaxonomyNotFound { id: 42 }));

    assert!(h.jobs.all_jobs().is_empty());
}

#[tokio::test]
async fn test_late_result_after_cancel_is_discarded() {
    let h = Harness::new(10);
    h.records
        .add_annotation(annotation(1, 5, 1, 1, Utc::now() - Duration::minutes(1)));
    h.remote.hold();

    let job = h.orchestrator.request_learning(1).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    // 外部操作者直接写入取消状态，监控仍在运行
    h.jobs.set_status(job.id, JobStatus::Cancelled);

    h.remote.release();
    let monitors = h.orchestrator.monitors().clone();
    assert!(
        TestEnv::wait_for(
            || {
                let idle = monitors.active_count() == 0;
                async move { idle }
            },
            StdDuration::from_secs(5),
        )
        .await
    );

    assert_eq!(h.jobs.job(job.id).unwrap().status, JobStatus::Cancelled);
    assert!(h.taxonomies.taxonomy(1).unwrap().last_learned_at.is_none());
}
