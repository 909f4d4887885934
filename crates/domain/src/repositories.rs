//! 领域仓储抽象
//!
//! 关系型存储是任务状态的唯一可信来源，所有调度判断都基于这里的查询。

use aijob_core::OrchestratorResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Annotation, ColumnMapping, Job, JobKind, JobStateCache, JobStatus, LabelingRecord, Taxonomy,
    TaxonomyNode,
};

/// 任务仓储：四种任务统一存放
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> OrchestratorResult<Job>;

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>>;

    async fn get_status(&self, id: i64) -> OrchestratorResult<Option<JobStatus>>;

    /// 是否存在处于任一给定状态的任务
    async fn exists_with_status(&self, statuses: &[JobStatus]) -> OrchestratorResult<bool>;

    /// 按 started_at 升序、种类顺序、ID 取最早的一条
    async fn find_oldest(
        &self,
        statuses: &[JobStatus],
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Option<Job>>;

    async fn find_by_status(
        &self,
        status: JobStatus,
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Vec<Job>>;

    /// 查找 started_at 早于 cutoff 的处理中任务
    async fn find_processing_started_before(
        &self,
        kind: JobKind,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Job>>;

    /// 条件认领：仅当任务仍为 PENDING 且系统中没有任何 PROCESSING 任务时
    /// 才迁移为 PROCESSING，并刷新 started_at、清空错误信息
    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> OrchestratorResult<bool>;

    async fn set_external_job_id(&self, id: i64, external_job_id: &str) -> OrchestratorResult<()>;

    /// 每个批次结束后持久化一次进度
    async fn update_progress(
        &self,
        id: i64,
        processed_units: i64,
        failed_units: i64,
    ) -> OrchestratorResult<()>;

    /// 记录瞬时错误信息，不改变状态
    async fn record_error(&self, id: i64, message: &str) -> OrchestratorResult<()>;

    /// 写入终态；任务已是终态时不做修改并返回 false。
    /// 写入 COMPLETED 时 processed_units 同步为 total_units。
    async fn finish(
        &self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> OrchestratorResult<bool>;

    /// PROCESSING → PENDING，仅供看门狗使用
    async fn reset_to_pending(&self, id: i64, message: &str) -> OrchestratorResult<bool>;
}

/// 分类体系仓储
#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Taxonomy>>;

    async fn get_nodes(&self, taxonomy_id: i64) -> OrchestratorResult<Vec<TaxonomyNode>>;

    /// 覆盖写入当前任务缓存
    async fn set_job_state(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<()>;

    /// 仅当缓存仍指向 `state.job_id` 时更新，返回是否写入
    async fn update_job_state_if_current(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<bool>;

    async fn set_last_learned_at(
        &self,
        taxonomy_id: i64,
        learned_at: DateTime<Utc>,
    ) -> OrchestratorResult<()>;
}

/// 标注记录仓储
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 按ID批量读取，已删除的记录不返回
    async fn get_by_ids(&self, ids: &[i64]) -> OrchestratorResult<Vec<LabelingRecord>>;

    async fn get_column_mappings(&self, dataset_id: i64) -> OrchestratorResult<Vec<ColumnMapping>>;

    async fn save_suggestions(
        &self,
        record_id: i64,
        job_id: i64,
        suggestions: &serde_json::Value,
    ) -> OrchestratorResult<()>;

    /// 读取 `since` 之后新增的人工标注，`since` 为空时返回全部
    async fn annotations_since(
        &self,
        taxonomy_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Vec<Annotation>>;
}
