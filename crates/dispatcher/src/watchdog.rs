use std::sync::Arc;
use std::time::Duration;

use aijob_domain::{Job, JobKind, JobRepository, OrchestratorResult};
use chrono::Utc;
use tracing::{info, warn};

use crate::metrics::record_watchdog_recovered;

/// 看门狗配置
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// 处理中任务超过该时长视为卡死
    pub stuck_job_after: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stuck_job_after: Duration::from_secs(24 * 3_600),
        }
    }
}

/// 卡死任务看门狗
///
/// 在执行循环的每一轮开头内联运行，把长时间停留在处理中的批量标注任务
/// 重置为待处理，使其能从最后持久化的进度续跑。无法区分真正卡死和单纯很慢的任务。
pub struct StuckJobWatchdog {
    job_repo: Arc<dyn JobRepository>,
    config: WatchdogConfig,
}

impl StuckJobWatchdog {
    pub fn new(job_repo: Arc<dyn JobRepository>, config: Option<WatchdogConfig>) -> Self {
        Self {
            job_repo,
            config: config.unwrap_or_default(),
        }
    }

    /// 返回被重置的任务（重置前的快照）
    pub async fn recover_stuck_jobs(&self) -> OrchestratorResult<Vec<Job>> {
        let threshold = chrono::Duration::from_std(self.config.stuck_job_after)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - threshold;

        let stuck = self
            .job_repo
            .find_processing_started_before(JobKind::BulkLabeling, cutoff)
            .await?;
        if stuck.is_empty() {
            return Ok(stuck);
        }

        let message = format!(
            "任务处理超过 {} 小时未结束，已由看门狗重置为待处理",
            self.config.stuck_job_after.as_secs() / 3_600
        );
        let mut recovered = Vec::new();
        for job in stuck {
            if self.job_repo.reset_to_pending(job.id, &message).await? {
                warn!(
                    "任务 {} 自 {} 起处于处理中，已重置为待处理 (已处理: {}/{})",
                    job.id, job.started_at, job.processed_units, job.total_units
                );
                recovered.push(job);
            }
        }

        if !recovered.is_empty() {
            info!("看门狗恢复了 {} 个卡死任务", recovered.len());
            record_watchdog_recovered(recovered.len());
        }
        Ok(recovered)
    }
}
