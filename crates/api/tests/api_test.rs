use std::sync::Arc;
use std::time::Duration;

use aijob_api::create_app;
use aijob_dispatcher::Orchestrator;
use aijob_domain::{JobStatus, OrchestratorError};
use aijob_testing_utils::{
    node, text_mapping, FakeRemote, JobBuilder, MockJobRepository, MockRecordRepository,
    MockTaxonomyRepository, RecordBuilder, TaxonomyBuilder, TestEnv,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    jobs: MockJobRepository,
    remote: FakeRemote,
    orchestrator: Arc<Orchestrator>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let jobs = MockJobRepository::new();
        let taxonomies = MockTaxonomyRepository::new();
        let records = MockRecordRepository::new();
        let remote = FakeRemote::new();

        taxonomies.insert(TaxonomyBuilder::new().build());
        taxonomies.insert(TaxonomyBuilder::new().with_id(2).inactive().build());
        taxonomies.add_node(node(1, 1, None, "物流"));
        records.add_mapping(text_mapping(1));
        for id in 1..=5 {
            records.insert(RecordBuilder::new(id).build());
        }

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(jobs.clone()),
            Arc::new(taxonomies),
            Arc::new(records),
            TestEnv::fast_client(Arc::new(remote.clone())),
            TestEnv::fast_runner_config(2),
            TestEnv::remote_config(),
        ));
        let router = create_app(orchestrator.clone(), None);

        Self {
            jobs,
            remote,
            orchestrator,
            router,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method("POST").uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn wait_for_status(&self, job_id: i64, status: JobStatus) -> bool {
        let jobs = self.jobs.clone();
        TestEnv::wait_for(
            || {
                let reached = jobs.job(job_id).map(|j| j.status) == Some(status);
                async move { reached }
            },
            Duration::from_secs(5),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "aijob");
}

#[tokio::test]
async fn test_create_bulk_labeling_job_runs_to_completion() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/bulk-labeling/jobs",
            Some(json!({"taxonomy_id": 1, "record_ids": [1, 2, 3, 4, 5]})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["job"]["kind"], "BULK_LABELING");
    assert_eq!(body["data"]["job"]["total_units"], 5);

    let job_id = body["data"]["job"]["id"].as_i64().unwrap();
    assert!(app.wait_for_status(job_id, JobStatus::Completed).await);

    let (status, body) = app.get(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["processed_units"], 5);
    assert_eq!(app.remote.submit_count(), 3);
}

#[tokio::test]
async fn test_empty_record_ids_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/bulk-labeling/jobs",
            Some(json!({"taxonomy_id": 1, "record_ids": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "BAD_REQUEST");
    assert!(app.jobs.all_jobs().is_empty());
}

#[tokio::test]
async fn test_trigger_reports_outcome() {
    let app = TestApp::new();

    let (status, body) = app.post("/api/bulk-labeling/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(matches!(
        body["data"]["outcome"].as_str(),
        Some("started") | Some("already_running")
    ));
}

#[tokio::test]
async fn test_get_unknown_job_returns_404() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/jobs/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "JOB_NOT_FOUND");
}

#[tokio::test]
async fn test_taxonomy_sync_accepted_and_second_request_queued() {
    let app = TestApp::new();
    app.remote.hold();

    let (status, first) = app.post("/api/taxonomies/1/sync", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["data"]["status"], "PROCESSING");

    let (status, second) = app.post("/api/taxonomies/1/sync", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["data"]["status"], "PENDING");
    assert_eq!(second["message"], "已有任务在执行，新任务已排队");

    let (status, queue) = app.get("/api/queue").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["data"]["has_running_job"], true);
    assert_eq!(queue["data"]["next_pending"]["id"], second["data"]["id"]);

    app.remote.release();
    let second_id = second["data"]["id"].as_i64().unwrap();
    assert!(app.wait_for_status(second_id, JobStatus::Completed).await);
}

#[tokio::test]
async fn test_sync_for_inactive_or_unknown_taxonomy() {
    let app = TestApp::new();

    let (status, _) = app.post("/api/taxonomies/2/sync", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app.post("/api/taxonomies/42/sync", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TAXONOMY_NOT_FOUND");
    assert!(app.jobs.all_jobs().is_empty());
}

#[tokio::test]
async fn test_learning_without_annotations_is_422() {
    let app = TestApp::new();

    let (status, body) = app.post("/api/taxonomies/1/learn", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["type"], "INVALID_DATA");
}

#[tokio::test]
async fn test_training_job_validation_and_submit() {
    let app = TestApp::new();

    let (status, _) = app
        .post(
            "/api/training-jobs",
            Some(json!({"taxonomy_id": 1, "training_file": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/training-jobs",
            Some(json!({"taxonomy_id": 1, "training_file": "uploads/train.csv"})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["kind"], "EXTERNAL_TRAINING");

    let submitted = app.remote.submissions_to("/v1/jobs/training");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["training_file"], "uploads/train.csv");
}

#[tokio::test]
async fn test_remote_failure_maps_to_502() {
    let app = TestApp::new();
    app.remote.fail_next_submits(1, 500);

    let (status, body) = app.post("/api/taxonomies/1/sync", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["type"], "REMOTE_ERROR");
}

#[tokio::test]
async fn test_cancel_pending_then_again() {
    let app = TestApp::new();
    app.jobs.insert(JobBuilder::new().with_id(10).taxonomy_sync().build());

    let (status, body) = app.post("/api/jobs/10/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], true);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, body) = app.post("/api/jobs/10/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], false);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let (status, _) = app.post("/api/jobs/404/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let (status, _) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let router = create_app(app.orchestrator.clone(), Some(handle));
    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn test_served_over_http() {
    let app = TestApp::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/bulk-labeling/jobs"))
        .json(&json!({"taxonomy_id": 1, "record_ids": [1, 2]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: Value = response.json().await.unwrap();
    let job_id = body["data"]["job"]["id"].as_i64().unwrap();
    assert!(app.wait_for_status(job_id, JobStatus::Completed).await);

    let response = client
        .get(format!("http://{addr}/api/jobs/{job_id}"))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["processed_units"], 2);
}

#[test]
fn test_orchestrator_errors_keep_their_variant() {
    let err = aijob_api::error::ApiError::from(OrchestratorError::JobNotFound { id: 3 });
    assert!(err.to_string().contains('3'));
}
