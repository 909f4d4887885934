use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use aijob_domain::{Job, JobKind, JobRepository, JobStatus, OrchestratorResult};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

/// 某一种类任务的启动能力
///
/// 协调器只持有启动器的弱引用，启动器本身反过来持有协调器。
#[async_trait]
pub trait JobStarter: Send + Sync {
    /// 启动一个待处理任务，返回是否真正启动（认领失败时为 false）
    async fn start(&self, job: Job) -> OrchestratorResult<bool>;

    /// 进程重启后接管一个仍处于处理中的任务
    async fn resume(&self, job: Job) -> OrchestratorResult<()>;
}

/// 队列概况
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub has_active_job: bool,
    pub has_running_job: bool,
    pub running: Option<Job>,
    pub next_pending: Option<Job>,
}

/// 单飞队列协调器
///
/// 所有判断都来自任务仓储，协调器自身不缓存任何队列状态。
pub struct QueueCoordinator {
    job_repo: Arc<dyn JobRepository>,
    starters: RwLock<HashMap<JobKind, Weak<dyn JobStarter>>>,
}

impl QueueCoordinator {
    pub fn new(job_repo: Arc<dyn JobRepository>) -> Self {
        Self {
            job_repo,
            starters: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_starter<S>(&self, kind: JobKind, starter: &Arc<S>)
    where
        S: JobStarter + 'static,
    {
        let starter: Arc<dyn JobStarter> = starter.clone();
        let weak = Arc::downgrade(&starter);
        self.starters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, weak);
        debug!("已注册 {} 任务启动器", kind);
    }

    fn starter_for(&self, kind: JobKind) -> Option<Arc<dyn JobStarter>> {
        self.starters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .and_then(Weak::upgrade)
    }

    /// 任意种类存在待处理或处理中的任务
    pub async fn has_active_job(&self) -> OrchestratorResult<bool> {
        self.job_repo.exists_with_status(&JobStatus::ACTIVE).await
    }

    pub async fn has_running_job(&self) -> OrchestratorResult<bool> {
        self.job_repo
            .exists_with_status(&[JobStatus::Processing])
            .await
    }

    /// 跨种类最早的待处理任务
    pub async fn next_pending_job(&self) -> OrchestratorResult<Option<Job>> {
        self.job_repo.find_oldest(&[JobStatus::Pending], None).await
    }

    /// 没有任务在处理时，把下一个待处理任务交给对应种类的启动器
    ///
    /// 返回被启动的任务ID。启动器报错但任务已离开待处理状态（已被标记失败）时，
    /// 继续尝试下一个任务，避免一个坏任务卡住整个队列。
    #[instrument(skip(self))]
    pub async fn process_next_queued(&self) -> OrchestratorResult<Option<i64>> {
        loop {
            if self.has_running_job().await? {
                debug!("已有任务在处理中，等待其结束后再调度");
                return Ok(None);
            }

            let Some(job) = self.next_pending_job().await? else {
                debug!("队列为空");
                return Ok(None);
            };
            let job_id = job.id;
            let kind = job.kind;

            let Some(starter) = self.starter_for(kind) else {
                warn!("{} 没有可用的启动器，任务 {} 保持待处理", kind, job_id);
                return Ok(None);
            };

            info!("调度下一个待处理任务: {}", job.entity_description());
            match starter.start(job).await {
                Ok(true) => return Ok(Some(job_id)),
                Ok(false) => {
                    debug!("任务 {} 未被认领，可能已被其他调用方启动", job_id);
                    return Ok(None);
                }
                Err(e) => {
                    error!("启动任务 {} 失败: {}", job_id, e);
                    match self.job_repo.get_status(job_id).await? {
                        Some(JobStatus::Pending) => return Err(e),
                        _ => continue,
                    }
                }
            }
        }
    }

    /// 启动时接管仍处于处理中的非批量任务，然后推进队列
    ///
    /// 批量标注任务由执行循环自行续跑。
    pub async fn resume_in_flight(&self) -> OrchestratorResult<usize> {
        let processing = self
            .job_repo
            .find_by_status(JobStatus::Processing, None)
            .await?;

        let mut resumed = 0;
        for job in processing
            .into_iter()
            .filter(|j| j.kind != JobKind::BulkLabeling)
        {
            let Some(starter) = self.starter_for(job.kind) else {
                warn!("{} 没有可用的启动器，无法接管任务 {}", job.kind, job.id);
                continue;
            };
            let job_id = job.id;
            match starter.resume(job).await {
                Ok(()) => resumed += 1,
                Err(e) => error!("接管任务 {} 失败: {}", job_id, e),
            }
        }

        if resumed > 0 {
            info!("已接管 {} 个处理中的外部任务", resumed);
        }
        self.process_next_queued().await?;
        Ok(resumed)
    }

    pub async fn snapshot(&self) -> OrchestratorResult<QueueSnapshot> {
        let running = self
            .job_repo
            .find_oldest(&[JobStatus::Processing], None)
            .await?;
        let next_pending = self.next_pending_job().await?;
        Ok(QueueSnapshot {
            has_active_job: running.is_some() || next_pending.is_some(),
            has_running_job: running.is_some(),
            running,
            next_pending,
        })
    }
}
