use std::sync::Arc;

use aijob_domain::{
    JobKind, JobRepository, JobStateCache, JobStatus, OrchestratorError, OrchestratorResult,
    TaxonomyRepository,
};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::coordinator::QueueCoordinator;
use crate::metrics::record_job_finished;
use crate::monitor::MonitorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// 任务已处于该终态，未做修改
    AlreadyFinished(JobStatus),
}

/// 任务取消
///
/// 批量标注任务由执行循环在下一个批次开始前发现取消并停止；
/// 其他种类的任务直接中止后台监控。
pub struct JobCanceller {
    job_repo: Arc<dyn JobRepository>,
    taxonomy_repo: Arc<dyn TaxonomyRepository>,
    coordinator: Arc<QueueCoordinator>,
    monitors: Arc<MonitorRegistry>,
}

impl JobCanceller {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        taxonomy_repo: Arc<dyn TaxonomyRepository>,
        coordinator: Arc<QueueCoordinator>,
        monitors: Arc<MonitorRegistry>,
    ) -> Self {
        Self {
            job_repo,
            taxonomy_repo,
            coordinator,
            monitors,
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: i64) -> OrchestratorResult<CancelOutcome> {
        let job = self
            .job_repo
            .get_by_id(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })?;
        if job.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished(job.status));
        }

        let completed_at = Utc::now();
        let message = "任务已被取消";
        if !self
            .job_repo
            .finish(job_id, JobStatus::Cancelled, Some(message), completed_at)
            .await?
        {
            let status = self
                .job_repo
                .get_status(job_id)
                .await?
                .unwrap_or(JobStatus::Cancelled);
            return Ok(CancelOutcome::AlreadyFinished(status));
        }

        record_job_finished(job.kind, JobStatus::Cancelled);
        info!("{} 已取消 (取消前状态: {})", job.entity_description(), job.status);

        if self.monitors.cancel(job_id) {
            info!("已停止任务 {} 的外部任务监控", job_id);
        }

        if job.kind.is_tracked_on_taxonomy() {
            let state = JobStateCache {
                job_id,
                status: JobStatus::Cancelled,
                error_message: Some(message.to_string()),
                updated_at: completed_at,
            };
            if let Err(e) = self
                .taxonomy_repo
                .update_job_state_if_current(job.taxonomy_id, job.kind, &state)
                .await
            {
                warn!("更新分类体系 {} 的任务缓存失败: {}", job.taxonomy_id, e);
            }
        }

        if job.status == JobStatus::Processing && job.kind != JobKind::BulkLabeling {
            // 取消已生效，调度失败不影响结果
            if let Err(e) = self.coordinator.process_next_queued().await {
                error!("任务 {} 取消后调度下一个待处理任务失败: {}", job_id, e);
            }
        }
        Ok(CancelOutcome::Cancelled)
    }
}
