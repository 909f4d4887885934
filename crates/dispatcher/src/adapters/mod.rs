//! 学习、分类体系同步与外部训练任务的适配器
//!
//! 三种任务共享同一套流程：构建载荷 → 提交 → 记录外部句柄 → 后台监控 →
//! 写回终态并推进队列。差异只在载荷构建和成功后的附加写入，由 [`PayloadBuilder`] 提供。

mod external_training;
mod learning;
mod taxonomy_sync;

use std::sync::{Arc, Weak};

use aijob_client::ExternalJobClient;
use aijob_core::{OrchestratorError, RemoteServiceConfig};
use aijob_domain::{
    Job, JobKind, JobPayload, JobRepository, JobStateCache, JobStatus, OrchestratorResult,
    Taxonomy, TaxonomyRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::coordinator::{JobStarter, QueueCoordinator};
use crate::metrics::record_job_finished;
use crate::monitor::MonitorRegistry;

pub use external_training::ExternalTrainingPayload;
pub use learning::LearningPayload;
pub use taxonomy_sync::TaxonomySyncPayload;

/// 种类相关的载荷构建与结果处理
#[async_trait]
pub trait PayloadBuilder: Send + Sync {
    fn kind(&self) -> JobKind;

    fn submit_path<'a>(&self, remote: &'a RemoteServiceConfig) -> &'a str;

    async fn build_payload(&self, job: &Job, taxonomy: &Taxonomy) -> OrchestratorResult<Value>;

    /// 外部任务成功后调用；`snapshot_at` 为构建载荷前记录的时间
    async fn on_success(
        &self,
        _job: &Job,
        _snapshot_at: DateTime<Utc>,
        _result: &Value,
    ) -> OrchestratorResult<()> {
        Ok(())
    }
}

/// 适配器共享的依赖
#[derive(Clone)]
pub struct AdapterContext {
    pub job_repo: Arc<dyn JobRepository>,
    pub taxonomy_repo: Arc<dyn TaxonomyRepository>,
    pub client: ExternalJobClient,
    pub coordinator: Arc<QueueCoordinator>,
    pub monitors: Arc<MonitorRegistry>,
    pub remote: RemoteServiceConfig,
}

pub struct KindAdapter {
    self_ref: Weak<Self>,
    builder: Arc<dyn PayloadBuilder>,
    ctx: AdapterContext,
}

impl KindAdapter {
    pub fn new(builder: Arc<dyn PayloadBuilder>, ctx: AdapterContext) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            builder,
            ctx,
        })
    }

    pub fn kind(&self) -> JobKind {
        self.builder.kind()
    }

    /// 创建任务：系统空闲时立即启动，否则排队等待其他任务结束后由协调器启动
    ///
    /// 启动失败时任务已被标记为失败，错误原样返回给调用方。
    #[instrument(skip(self, payload), fields(kind = %self.kind()))]
    pub async fn request(&self, taxonomy_id: i64, payload: JobPayload) -> OrchestratorResult<Job> {
        if payload.kind() != self.kind() {
            return Err(OrchestratorError::internal(format!(
                "{} 适配器收到了 {} 载荷",
                self.kind(),
                payload.kind()
            )));
        }
        self.load_active_taxonomy(taxonomy_id).await?;

        let busy = self.ctx.coordinator.has_active_job().await?;
        let job = self
            .ctx
            .job_repo
            .create(&Job::new(taxonomy_id, payload))
            .await?;
        if self.kind().is_tracked_on_taxonomy() {
            self.ctx
                .taxonomy_repo
                .set_job_state(taxonomy_id, self.kind(), &JobStateCache::of(&job))
                .await?;
        }

        if busy {
            info!("已有任务在执行，{} 进入排队", job.entity_description());
            return Ok(job);
        }

        if let Err(e) = self.start(job.clone()).await {
            self.hand_off().await;
            return Err(e);
        }
        Ok(self.ctx.job_repo.get_by_id(job.id).await?.unwrap_or(job))
    }

    async fn load_active_taxonomy(&self, taxonomy_id: i64) -> OrchestratorResult<Taxonomy> {
        let taxonomy = self
            .ctx
            .taxonomy_repo
            .get_by_id(taxonomy_id)
            .await?
            .ok_or(OrchestratorError::TaxonomyNotFound { id: taxonomy_id })?;
        if !taxonomy.is_active {
            return Err(OrchestratorError::data(format!(
                "分类体系 {} 已停用",
                taxonomy.name
            )));
        }
        Ok(taxonomy)
    }

    async fn launch(&self, job: &Job) -> OrchestratorResult<()> {
        let taxonomy = self.load_active_taxonomy(job.taxonomy_id).await?;
        let snapshot_at = Utc::now();
        let payload = self.builder.build_payload(job, &taxonomy).await?;
        let handle = self
            .ctx
            .client
            .submit(self.builder.submit_path(&self.ctx.remote), &payload)
            .await?;
        self.ctx.job_repo.set_external_job_id(job.id, &handle).await?;
        info!("{} 已提交，外部句柄 {}", job.entity_description(), handle);

        self.attach_monitor(job.clone(), handle, snapshot_at);
        Ok(())
    }

    fn attach_monitor(&self, job: Job, handle: String, snapshot_at: DateTime<Utc>) {
        let Some(this) = self.self_ref.upgrade() else {
            return;
        };
        let job_id = job.id;
        let monitor = self.ctx.client.spawn_monitor(
            handle,
            self.ctx.remote.status_path.clone(),
            move |result| async move { this.complete(job, snapshot_at, result).await },
        );
        self.ctx.monitors.register(job_id, monitor);
    }

    /// 监控结束后的唯一出口：写回结果，然后推进队列
    async fn complete(&self, job: Job, snapshot_at: DateTime<Utc>, result: OrchestratorResult<Value>) {
        if let Err(e) = self.record_result(&job, snapshot_at, result).await {
            error!("写回任务 {} 的结果失败: {}", job.id, e);
        }
        self.hand_off().await;
    }

    async fn record_result(
        &self,
        job: &Job,
        snapshot_at: DateTime<Utc>,
        result: OrchestratorResult<Value>,
    ) -> OrchestratorResult<()> {
        match self.ctx.job_repo.get_status(job.id).await? {
            Some(status) if status.is_terminal() => {
                info!("任务 {} 已是终态 {}，丢弃外部结果", job.id, status);
                return Ok(());
            }
            None => {
                warn!("任务 {} 已不存在，丢弃外部结果", job.id);
                return Ok(());
            }
            Some(_) => {}
        }

        let (status, message) = match result {
            Ok(body) => match self.builder.on_success(job, snapshot_at, &body).await {
                Ok(()) => (JobStatus::Completed, None),
                Err(e) => (JobStatus::Failed, Some(format!("保存外部任务结果失败: {e}"))),
            },
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };
        self.finish(job, status, message.as_deref()).await?;
        Ok(())
    }

    async fn finish(
        &self,
        job: &Job,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> OrchestratorResult<bool> {
        let completed_at = Utc::now();
        let written = self
            .ctx
            .job_repo
            .finish(job.id, status, error_message, completed_at)
            .await?;
        if !written {
            debug!("任务 {} 已是终态，不再写入 {}", job.id, status);
            return Ok(false);
        }

        record_job_finished(job.kind, status);
        match status {
            JobStatus::Failed => error!(
                "{} 失败: {}",
                job.entity_description(),
                error_message.unwrap_or_default()
            ),
            _ => info!("{} 结束，状态: {}", job.entity_description(), status),
        }

        if job.kind.is_tracked_on_taxonomy() {
            let state = JobStateCache {
                job_id: job.id,
                status,
                error_message: error_message.map(str::to_string),
                updated_at: completed_at,
            };
            if let Err(e) = self
                .ctx
                .taxonomy_repo
                .update_job_state_if_current(job.taxonomy_id, job.kind, &state)
                .await
            {
                warn!("更新分类体系 {} 的任务缓存失败: {}", job.taxonomy_id, e);
            }
        }
        Ok(true)
    }

    async fn refresh_cache(&self, job: &Job) {
        if !job.kind.is_tracked_on_taxonomy() {
            return;
        }
        if let Err(e) = self
            .ctx
            .taxonomy_repo
            .update_job_state_if_current(job.taxonomy_id, job.kind, &JobStateCache::of(job))
            .await
        {
            warn!("更新分类体系 {} 的任务缓存失败: {}", job.taxonomy_id, e);
        }
    }

    async fn hand_off(&self) {
        if let Err(e) = self.ctx.coordinator.process_next_queued().await {
            error!("调度下一个待处理任务失败: {}", e);
        }
    }
}

#[async_trait]
impl JobStarter for KindAdapter {
    async fn start(&self, job: Job) -> OrchestratorResult<bool> {
        if !self.ctx.job_repo.try_claim(job.id, Utc::now()).await? {
            debug!("任务 {} 认领失败", job.id);
            return Ok(false);
        }
        let job = self
            .ctx
            .job_repo
            .get_by_id(job.id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job.id })?;
        self.refresh_cache(&job).await;

        if let Err(e) = self.launch(&job).await {
            if let Err(write_err) = self.finish(&job, JobStatus::Failed, Some(&e.to_string())).await {
                error!("无法将任务 {} 标记为失败: {}", job.id, write_err);
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn resume(&self, job: Job) -> OrchestratorResult<()> {
        match job.external_job_id.clone() {
            Some(handle) => {
                info!("重新监控 {} (外部句柄 {})", job.entity_description(), handle);
                let snapshot_at = job.started_at;
                self.attach_monitor(job, handle, snapshot_at);
            }
            None => {
                warn!("{} 在提交前中断，标记为失败", job.entity_description());
                self.finish(&job, JobStatus::Failed, Some("进程重启时任务尚未提交到外部服务"))
                    .await?;
            }
        }
        Ok(())
    }
}
