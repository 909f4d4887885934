use std::sync::Arc;
use std::time::Duration;

use aijob_client::ExternalJobClient;
use aijob_core::{RemoteServiceConfig, RunnerConfig};
use aijob_domain::{
    Job, JobKind, JobPayload, JobRepository, OrchestratorResult, RecordRepository,
    TaxonomyRepository,
};
use serde::Serialize;
use tracing::info;

use crate::adapters::{
    AdapterContext, ExternalTrainingPayload, KindAdapter, LearningPayload, TaxonomySyncPayload,
};
use crate::batch_runner::{BulkLabelingRunner, TriggerOutcome};
use crate::cancel::{CancelOutcome, JobCanceller};
use crate::coordinator::{QueueCoordinator, QueueSnapshot};
use crate::monitor::MonitorRegistry;
use crate::run_state::RunStateSnapshot;

/// 队列与执行循环的整体状态
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    #[serde(flatten)]
    pub queue: QueueSnapshot,
    pub runner: RunStateSnapshot,
    pub active_monitors: usize,
}

/// 组装协调器、执行器、适配器与取消入口
pub struct Orchestrator {
    coordinator: Arc<QueueCoordinator>,
    runner: Arc<BulkLabelingRunner>,
    learning: Arc<KindAdapter>,
    taxonomy_sync: Arc<KindAdapter>,
    external_training: Arc<KindAdapter>,
    canceller: JobCanceller,
    monitors: Arc<MonitorRegistry>,
    job_repo: Arc<dyn JobRepository>,
}

impl Orchestrator {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        taxonomy_repo: Arc<dyn TaxonomyRepository>,
        record_repo: Arc<dyn RecordRepository>,
        client: ExternalJobClient,
        runner_config: RunnerConfig,
        remote: RemoteServiceConfig,
    ) -> Self {
        let coordinator = Arc::new(QueueCoordinator::new(job_repo.clone()));
        let monitors = Arc::new(MonitorRegistry::new());

        let runner = BulkLabelingRunner::new(
            job_repo.clone(),
            taxonomy_repo.clone(),
            record_repo.clone(),
            client.clone(),
            coordinator.clone(),
            runner_config,
            remote.clone(),
        );

        let ctx = AdapterContext {
            job_repo: job_repo.clone(),
            taxonomy_repo: taxonomy_repo.clone(),
            client,
            coordinator: coordinator.clone(),
            monitors: monitors.clone(),
            remote,
        };
        let learning = KindAdapter::new(
            Arc::new(LearningPayload::new(record_repo, taxonomy_repo.clone())),
            ctx.clone(),
        );
        let taxonomy_sync = KindAdapter::new(
            Arc::new(TaxonomySyncPayload::new(taxonomy_repo.clone())),
            ctx.clone(),
        );
        let external_training = KindAdapter::new(Arc::new(ExternalTrainingPayload::new()), ctx);

        coordinator.register_starter(JobKind::BulkLabeling, &runner);
        coordinator.register_starter(JobKind::Learning, &learning);
        coordinator.register_starter(JobKind::TaxonomySync, &taxonomy_sync);
        coordinator.register_starter(JobKind::ExternalTraining, &external_training);

        let canceller = JobCanceller::new(
            job_repo.clone(),
            taxonomy_repo,
            coordinator.clone(),
            monitors.clone(),
        );

        Self {
            coordinator,
            runner,
            learning,
            taxonomy_sync,
            external_training,
            canceller,
            monitors,
            job_repo,
        }
    }

    /// 启动时调用：接管处理中的外部任务，然后唤醒批量标注执行循环
    pub async fn start(&self) -> OrchestratorResult<TriggerOutcome> {
        let resumed = self.coordinator.resume_in_flight().await?;
        let outcome = self.runner.trigger();
        info!("编排器已启动 (接管外部任务: {}, 执行循环: {:?})", resumed, outcome);
        Ok(outcome)
    }

    /// 等待后台监控结束，返回被强制中止的数量
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.monitors.drain(timeout).await
    }

    pub fn coordinator(&self) -> &Arc<QueueCoordinator> {
        &self.coordinator
    }

    pub fn runner(&self) -> &Arc<BulkLabelingRunner> {
        &self.runner
    }

    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        &self.monitors
    }

    pub fn trigger_bulk_labeling(&self) -> TriggerOutcome {
        self.runner.trigger()
    }

    pub async fn submit_bulk_labeling(
        &self,
        taxonomy_id: i64,
        record_ids: Vec<i64>,
    ) -> OrchestratorResult<(Job, TriggerOutcome)> {
        self.runner.submit(taxonomy_id, record_ids).await
    }

    pub async fn request_taxonomy_sync(&self, taxonomy_id: i64) -> OrchestratorResult<Job> {
        self.taxonomy_sync
            .request(taxonomy_id, JobPayload::TaxonomySync)
            .await
    }

    pub async fn request_learning(&self, taxonomy_id: i64) -> OrchestratorResult<Job> {
        self.learning.request(taxonomy_id, JobPayload::Learning).await
    }

    pub async fn request_external_training(
        &self,
        taxonomy_id: i64,
        training_file: String,
    ) -> OrchestratorResult<Job> {
        self.external_training
            .request(taxonomy_id, JobPayload::ExternalTraining { training_file })
            .await
    }

    pub async fn cancel(&self, job_id: i64) -> OrchestratorResult<CancelOutcome> {
        self.canceller.cancel(job_id).await
    }

    pub async fn get_job(&self, job_id: i64) -> OrchestratorResult<Option<Job>> {
        self.job_repo.get_by_id(job_id).await
    }

    pub async fn status(&self) -> OrchestratorResult<OrchestratorStatus> {
        Ok(OrchestratorStatus {
            queue: self.coordinator.snapshot().await?,
            runner: self.runner.run_state(),
            active_monitors: self.monitors.active_count(),
        })
    }
}
