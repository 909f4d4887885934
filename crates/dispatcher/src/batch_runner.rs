use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use aijob_client::{panic_message, ExternalJobClient};
use aijob_core::{RemoteServiceConfig, RunnerConfig};
use aijob_domain::{
    build_record_payload, ColumnMapping, Job, JobKind, JobProgress, JobRepository, JobStatus,
    OrchestratorResult, RecordRepository, TaxonomyRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::coordinator::{JobStarter, QueueCoordinator};
use crate::metrics::{record_batch, record_batch_error, record_job_finished};
use crate::run_state::{Acquire, RunGuard, RunStateSnapshot};
use crate::watchdog::{StuckJobWatchdog, WatchdogConfig};

/// 触发入口的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
    /// 原运行锁已失效，被新循环覆盖
    StaleLockOverridden,
}

/// 单个任务的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Finished(JobStatus),
    /// 任务不再归本循环处理（被新循环取代或状态被外部改写）
    Stopped,
}

/// 批量标注执行器
///
/// 一个进程内最多一个执行循环。循环按 FIFO 取出批量标注任务，
/// 逐批提交到外部服务，每批结束持久化一次进度。
pub struct BulkLabelingRunner {
    self_ref: Weak<Self>,
    job_repo: Arc<dyn JobRepository>,
    taxonomy_repo: Arc<dyn TaxonomyRepository>,
    record_repo: Arc<dyn RecordRepository>,
    client: ExternalJobClient,
    coordinator: Arc<QueueCoordinator>,
    watchdog: StuckJobWatchdog,
    guard: RunGuard,
    config: RunnerConfig,
    remote: RemoteServiceConfig,
}

impl BulkLabelingRunner {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        taxonomy_repo: Arc<dyn TaxonomyRepository>,
        record_repo: Arc<dyn RecordRepository>,
        client: ExternalJobClient,
        coordinator: Arc<QueueCoordinator>,
        config: RunnerConfig,
        remote: RemoteServiceConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| {
            let watchdog = StuckJobWatchdog::new(
                job_repo.clone(),
                Some(WatchdogConfig {
                    stuck_job_after: config.stuck_job_after(),
                }),
            );
            Self {
                self_ref: self_ref.clone(),
                guard: RunGuard::new(config.lock_stale_after()),
                job_repo,
                taxonomy_repo,
                record_repo,
                client,
                coordinator,
                watchdog,
                config,
                remote,
            }
        })
    }

    /// 启动执行循环；循环已在运行且未失效时不做任何事，可重复调用
    pub fn trigger(&self) -> TriggerOutcome {
        let (generation, outcome) = match self.guard.try_acquire(Utc::now()) {
            Acquire::Busy { since } => {
                debug!("批量标注执行循环自 {} 起运行中，忽略本次触发", since);
                return TriggerOutcome::AlreadyRunning;
            }
            Acquire::Acquired { generation } => (generation, TriggerOutcome::Started),
            Acquire::Overrode {
                generation,
                previous_since,
            } => {
                warn!(
                    "批量标注执行锁自 {} 起未释放，视为失效并启动新循环",
                    previous_since
                );
                (generation, TriggerOutcome::StaleLockOverridden)
            }
        };

        let Some(this) = self.self_ref.upgrade() else {
            self.guard.release(generation);
            return TriggerOutcome::AlreadyRunning;
        };
        tokio::spawn(async move { this.run_loop(generation).await });
        outcome
    }

    /// 创建批量标注任务并触发执行循环
    ///
    /// 记录ID列表在此刻冻结，任务范围不随数据集后续变化。
    pub async fn submit(
        &self,
        taxonomy_id: i64,
        record_ids: Vec<i64>,
    ) -> OrchestratorResult<(Job, TriggerOutcome)> {
        let job = self
            .job_repo
            .create(&Job::bulk_labeling(taxonomy_id, record_ids))
            .await?;
        info!(
            "已创建批量标注任务 {} (分类体系: {}, 记录数: {})",
            job.id, taxonomy_id, job.total_units
        );
        let outcome = self.trigger();
        Ok((job, outcome))
    }

    pub fn run_state(&self) -> RunStateSnapshot {
        self.guard.snapshot(Utc::now())
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.run_state(), RunStateSnapshot::Idle)
    }

    async fn run_loop(self: Arc<Self>, generation: u64) {
        info!("批量标注执行循环启动 (代号 {})", generation);

        loop {
            if !self.guard.is_current(generation) {
                info!("执行循环 (代号 {}) 已被取代，退出", generation);
                return;
            }

            if let Err(e) = self.watchdog.recover_stuck_jobs().await {
                warn!("看门狗检查失败: {}", e);
            }

            let job = match self.next_job().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!("查找下一个批量标注任务失败: {}", e);
                    break;
                }
            };

            match self.process_job_guarded(job, generation).await {
                Some(JobOutcome::Finished(status)) => {
                    debug!("任务处理结束，状态: {}", status);
                    self.hand_off().await;
                }
                Some(JobOutcome::Stopped) => {}
                None => break,
            }
        }

        self.guard.release(generation);
        debug!("批量标注执行循环 (代号 {}) 结束", generation);
        // 释放后再推进一次，接住循环退出期间被忽略的触发
        self.hand_off().await;
    }

    async fn hand_off(&self) {
        if let Err(e) = self.coordinator.process_next_queued().await {
            error!("调度下一个待处理任务失败: {}", e);
        }
    }

    /// 优先续跑处理中的批量任务；否则仅当最早的批量任务也是全局最早的待处理任务时认领它
    async fn next_job(&self) -> OrchestratorResult<Option<Job>> {
        if let Some(job) = self
            .job_repo
            .find_oldest(&[JobStatus::Processing], Some(JobKind::BulkLabeling))
            .await?
        {
            info!(
                "续跑处理中的任务 {} (已处理: {}/{})",
                job.id, job.processed_units, job.total_units
            );
            return Ok(Some(job));
        }

        let Some(candidate) = self
            .job_repo
            .find_oldest(&[JobStatus::Pending], Some(JobKind::BulkLabeling))
            .await?
        else {
            return Ok(None);
        };

        let next = self.coordinator.next_pending_job().await?;
        if next.map(|j| j.id) != Some(candidate.id) {
            debug!("队列中有更早的其他种类任务，批量任务 {} 继续排队", candidate.id);
            return Ok(None);
        }

        if !self.job_repo.try_claim(candidate.id, Utc::now()).await? {
            debug!("认领任务 {} 失败，已有任务在处理中", candidate.id);
            return Ok(None);
        }
        self.job_repo.get_by_id(candidate.id).await
    }

    /// 处理单个任务，任何错误或 panic 都会把该任务标记为失败
    ///
    /// 只有失败状态也无法写入时返回 None，此时循环停止。
    async fn process_job_guarded(&self, job: Job, generation: u64) -> Option<JobOutcome> {
        let job_id = job.id;
        let result = AssertUnwindSafe(self.process_job(job, generation))
            .catch_unwind()
            .await;

        let message = match result {
            Ok(Ok(outcome)) => return Some(outcome),
            Ok(Err(e)) => format!("任务执行出错: {e}"),
            Err(panic) => format!("任务执行异常: {}", panic_message(panic.as_ref())),
        };
        error!("任务 {} 处理失败: {}", job_id, message);

        match self
            .job_repo
            .finish(job_id, JobStatus::Failed, Some(&message), Utc::now())
            .await
        {
            Ok(written) => {
                if written {
                    record_job_finished(JobKind::BulkLabeling, JobStatus::Failed);
                }
                Some(JobOutcome::Finished(JobStatus::Failed))
            }
            Err(e) => {
                error!("无法将任务 {} 标记为失败: {}", job_id, e);
                None
            }
        }
    }

    #[instrument(skip_all, fields(job_id = job.id, taxonomy_id = job.taxonomy_id))]
    async fn process_job(&self, job: Job, generation: u64) -> OrchestratorResult<JobOutcome> {
        match self.taxonomy_repo.get_by_id(job.taxonomy_id).await? {
            None => {
                let message = format!("分类体系 {} 不存在", job.taxonomy_id);
                return self.finish(&job, JobStatus::Failed, Some(&message)).await;
            }
            Some(taxonomy) if !taxonomy.is_active => {
                let message = format!("分类体系 {} 已停用", taxonomy.name);
                return self.finish(&job, JobStatus::Failed, Some(&message)).await;
            }
            Some(_) => {}
        }

        let record_ids = job.record_ids();
        if record_ids.is_empty() {
            return self
                .finish(&job, JobStatus::Failed, Some("任务没有需要标注的记录"))
                .await;
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = record_ids.len().div_ceil(batch_size);
        let mut progress = JobProgress::new(
            record_ids.len() as i64,
            job.processed_units,
            job.failed_units,
        );
        if progress.processed_units > 0 {
            info!(
                "从第 {} 条记录续跑 (共 {} 条)",
                progress.processed_units + 1,
                progress.total_units
            );
        }

        let mut mappings: HashMap<i64, Vec<ColumnMapping>> = HashMap::new();

        while !progress.is_done() {
            if !self.guard.is_current(generation) {
                warn!("执行循环已被取代，停止处理任务 {}", job.id);
                return Ok(JobOutcome::Stopped);
            }

            // 取消只在批次之间生效，进行中的外部调用不会被打断
            match self.job_repo.get_status(job.id).await? {
                Some(JobStatus::Processing) => {}
                Some(JobStatus::Cancelled) => {
                    info!("任务 {} 已被取消，停止后续批次", job.id);
                    return self
                        .finish(&job, JobStatus::Cancelled, Some("任务已被取消"))
                        .await;
                }
                Some(status) if status.is_terminal() => {
                    return Ok(JobOutcome::Finished(status));
                }
                other => {
                    warn!("任务 {} 状态变为 {:?}，停止处理", job.id, other);
                    return Ok(JobOutcome::Stopped);
                }
            }

            let offset = progress.processed_units as usize;
            let end = (offset + batch_size).min(record_ids.len());
            let batch = &record_ids[offset..end];
            let batch_no = offset / batch_size + 1;

            match self
                .run_batch_with_retry(&job, batch, batch_no, &mut mappings)
                .await
            {
                Ok(failed) => {
                    progress.advance(batch.len() as i64, failed as i64);
                    self.job_repo
                        .update_progress(job.id, progress.processed_units, progress.failed_units)
                        .await?;
                    info!(
                        batch = batch_no,
                        "第 {}/{} 批完成，进度 {}/{} (失败 {})",
                        batch_no,
                        total_batches,
                        progress.processed_units,
                        progress.total_units,
                        progress.failed_units
                    );
                }
                Err(e) => {
                    record_batch("failed");
                    let message = format!("第 {batch_no}/{total_batches} 批处理失败: {e}");
                    return self.finish(&job, JobStatus::Failed, Some(&message)).await;
                }
            }
        }

        self.finish(&job, JobStatus::Completed, None).await
    }

    /// 提交一个批次，可重试的错误按配置重试；返回失败的记录数
    async fn run_batch_with_retry(
        &self,
        job: &Job,
        batch: &[i64],
        batch_no: usize,
        mappings: &mut HashMap<i64, Vec<ColumnMapping>>,
    ) -> OrchestratorResult<usize> {
        let items = self.build_batch_items(batch, mappings).await?;
        if items.is_empty() {
            warn!("第 {} 批没有可提交的记录，跳过", batch_no);
            record_batch("skipped");
            return Ok(0);
        }

        let max_attempts = self.config.max_batch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.submit_batch(job, &items).await {
                Ok(failed) => {
                    record_batch("succeeded");
                    return Ok(failed);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    record_batch_error(&e);
                    let message = format!("第 {attempt}/{max_attempts} 次提交失败，将重试: {e}");
                    warn!(batch = batch_no, "{}", message);
                    self.job_repo.record_error(job.id, &message).await?;
                    record_batch("retried");
                    tokio::time::sleep(self.config.batch_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    record_batch_error(&e);
                    return Err(e);
                }
            }
        }
    }

    /// 已删除或载荷为空的记录不会出现在提交内容中
    async fn build_batch_items(
        &self,
        batch: &[i64],
        mappings: &mut HashMap<i64, Vec<ColumnMapping>>,
    ) -> OrchestratorResult<Vec<Value>> {
        let records = self.record_repo.get_by_ids(batch).await?;
        if records.len() < batch.len() {
            debug!("批次中有 {} 条记录已不存在", batch.len() - records.len());
        }

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let dataset_mappings = match mappings.entry(record.dataset_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(
                    self.record_repo
                        .get_column_mappings(record.dataset_id)
                        .await?,
                ),
            };
            let data = build_record_payload(&record, dataset_mappings);
            if data.is_empty() {
                debug!("记录 {} 没有可提交的列，跳过", record.id);
                continue;
            }
            items.push(json!({ "record_id": record.id, "data": data }));
        }
        Ok(items)
    }

    async fn submit_batch(&self, job: &Job, items: &[Value]) -> OrchestratorResult<usize> {
        let payload = json!({
            "taxonomy_id": job.taxonomy_id,
            "job_id": job.id,
            "records": items,
        });
        let handle = self
            .client
            .submit(&self.remote.bulk_labeling_path, &payload)
            .await?;
        self.job_repo.set_external_job_id(job.id, &handle).await?;

        let body = self
            .client
            .poll_until_terminal(&handle, &self.remote.status_path)
            .await?;

        let mut outstanding: HashSet<i64> = items
            .iter()
            .filter_map(|item| item["record_id"].as_i64())
            .collect();
        let results = body
            .pointer("/result/results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for entry in results {
            let Some(record_id) = entry.get("record_id").and_then(Value::as_i64) else {
                continue;
            };
            if !outstanding.contains(&record_id) {
                continue;
            }
            if let Some(err) = entry.get("error").filter(|e| !e.is_null()) {
                debug!("记录 {} 标注失败: {}", record_id, err);
                continue;
            }
            let suggestions = entry.get("suggestions").cloned().unwrap_or(Value::Null);
            self.record_repo
                .save_suggestions(record_id, job.id, &suggestions)
                .await?;
            outstanding.remove(&record_id);
        }

        if !outstanding.is_empty() {
            warn!("外部服务未返回 {} 条记录的有效结果", outstanding.len());
        }
        Ok(outstanding.len())
    }

    async fn finish(
        &self,
        job: &Job,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> OrchestratorResult<JobOutcome> {
        let written = self
            .job_repo
            .finish(job.id, status, error_message, Utc::now())
            .await?;
        if !written {
            let current = self.job_repo.get_status(job.id).await?;
            debug!("任务 {} 已是终态 {:?}，不再写入 {}", job.id, current, status);
            return Ok(JobOutcome::Finished(current.unwrap_or(status)));
        }

        record_job_finished(JobKind::BulkLabeling, status);
        match status {
            JobStatus::Failed => error!(
                "批量标注任务 {} 失败: {}",
                job.id,
                error_message.unwrap_or_default()
            ),
            _ => info!("批量标注任务 {} 结束，状态: {}", job.id, status),
        }
        Ok(JobOutcome::Finished(status))
    }
}

#[async_trait]
impl JobStarter for BulkLabelingRunner {
    /// 批量任务由执行循环认领，这里只负责唤醒循环
    ///
    /// 循环已在运行时返回 false：任务留给运行中的循环认领。
    async fn start(&self, job: Job) -> OrchestratorResult<bool> {
        let outcome = self.trigger();
        debug!("协调器唤醒批量标注执行循环 (任务 {}): {:?}", job.id, outcome);
        Ok(outcome != TriggerOutcome::AlreadyRunning)
    }

    /// 执行循环优先续跑处理中的批量任务，唤醒即可
    async fn resume(&self, job: Job) -> OrchestratorResult<()> {
        let outcome = self.trigger();
        debug!("唤醒批量标注执行循环续跑任务 {}: {:?}", job.id, outcome);
        Ok(())
    }
}
