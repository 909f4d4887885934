#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use aijob_core::RunnerConfig;
use aijob_dispatcher::Orchestrator;
use aijob_domain::JobStatus;
use aijob_testing_utils::{
    node, text_mapping, FakeRemote, MockJobRepository, MockRecordRepository,
    MockTaxonomyRepository, RecordBuilder, TaxonomyBuilder, TestEnv,
};

pub const LABELING_PATH: &str = "/v1/jobs/labeling";
pub const SYNC_PATH: &str = "/v1/jobs/taxonomy-sync";
pub const LEARNING_PATH: &str = "/v1/jobs/learning";
pub const TRAINING_PATH: &str = "/v1/jobs/training";

pub struct Harness {
    pub jobs: MockJobRepository,
    pub taxonomies: MockTaxonomyRepository,
    pub records: MockRecordRepository,
    pub remote: FakeRemote,
    pub orchestrator: Orchestrator,
}

impl Harness {
    /// 分类体系 1（含两个节点）与数据集 1 的 `text` 列映射已就绪
    pub fn new(batch_size: usize) -> Self {
        Self::with_config(TestEnv::fast_runner_config(batch_size))
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        let jobs = MockJobRepository::new();
        let taxonomies = MockTaxonomyRepository::new();
        let records = MockRecordRepository::new();
        let remote = FakeRemote::new();

        taxonomies.insert(TaxonomyBuilder::new().build());
        taxonomies.add_node(node(1, 1, None, "物流"));
        taxonomies.add_node(node(2, 1, Some(1), "配送延迟"));
        records.add_mapping(text_mapping(1));

        let orchestrator = Orchestrator::new(
            Arc::new(jobs.clone()),
            Arc::new(taxonomies.clone()),
            Arc::new(records.clone()),
            TestEnv::fast_client(Arc::new(remote.clone())),
            config,
            TestEnv::remote_config(),
        );

        Self {
            jobs,
            taxonomies,
            records,
            remote,
            orchestrator,
        }
    }

    pub fn seed_records(&self, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            self.records.insert(RecordBuilder::new(id).build());
        }
    }

    pub async fn wait_for_status(&self, job_id: i64, status: JobStatus) -> bool {
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

    pub async fn wait_until_runner_idle(&self) -> bool {
        let runner = self.orchestrator.runner().clone();
        TestEnv::wait_for(
            || {
                let idle = !runner.is_running();
                async move { idle }
            },
            Duration::from_secs(5),
        )
        .await
    }

    pub async fn wait_until_queue_drained(&self) -> bool {
        let jobs = self.jobs.clone();
        TestEnv::wait_for(
            || {
                let drained = jobs.all_jobs().iter().all(|j| j.status.is_terminal());
                async move { drained }
            },
            Duration::from_secs(5),
        )
        .await
    }
}
