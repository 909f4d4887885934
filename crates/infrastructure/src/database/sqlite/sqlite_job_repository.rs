use aijob_core::OrchestratorResult;
use aijob_domain::{Job, JobKind, JobPayload, JobRepository, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{OperationContext, RepositoryOperation};

const JOB_COLUMNS: &str = "id, kind, status, taxonomy_id, payload, external_job_id, total_units, \
     processed_units, failed_units, error_message, created_at, started_at, completed_at";

/// 同时间戳时按种类声明顺序裁决
const KIND_ORDER: &str = "CASE kind WHEN 'BULK_LABELING' THEN 0 WHEN 'LEARNING' THEN 1 \
     WHEN 'TAXONOMY_SYNC' THEN 2 ELSE 3 END";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn context(operation: RepositoryOperation) -> OperationContext {
        OperationContext::new(operation, "任务")
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Job> {
        let payload_json: String = row.try_get("payload")?;
        let payload: JobPayload = serde_json::from_str(&payload_json)?;

        Ok(Job {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            status: row.try_get("status")?,
            taxonomy_id: row.try_get("taxonomy_id")?,
            payload,
            external_job_id: row.try_get("external_job_id")?,
            total_units: row.try_get("total_units")?,
            processed_units: row.try_get("processed_units")?,
            failed_units: row.try_get("failed_units")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn placeholders(start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(kind = %job.kind, taxonomy_id = job.taxonomy_id))]
    async fn create(&self, job: &Job) -> OrchestratorResult<Job> {
        let context = Self::context(RepositoryOperation::Create).with_kind(job.kind);
        let payload_json =
            serde_json::to_string(&job.payload).map_err(|e| context.serialization_error(e))?;

        let sql = format!(
            "INSERT INTO ai_jobs (kind, status, taxonomy_id, payload, external_job_id, total_units, \
             processed_units, failed_units, error_message, created_at, started_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(job.kind)
            .bind(job.status)
            .bind(job.taxonomy_id)
            .bind(payload_json)
            .bind(&job.external_job_id)
            .bind(job.total_units)
            .bind(job.processed_units)
            .bind(job.failed_units)
            .bind(&job.error_message)
            .bind(job.created_at)
            .bind(job.started_at)
            .bind(job.completed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        let created = Self::row_to_job(&row)?;
        context
            .with_id(created.id)
            .log_success(Some(&format!("状态: {}", created.status)));
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>> {
        let context = Self::context(RepositoryOperation::Read).with_id(id);
        let sql = format!("SELECT {JOB_COLUMNS} FROM ai_jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        row.map(|row| Self::row_to_job(&row)).transpose()
    }

    async fn get_status(&self, id: i64) -> OrchestratorResult<Option<JobStatus>> {
        let context = Self::context(RepositoryOperation::Read).with_id(id);
        sqlx::query_scalar::<_, JobStatus>("SELECT status FROM ai_jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))
    }

    async fn exists_with_status(&self, statuses: &[JobStatus]) -> OrchestratorResult<bool> {
        if statuses.is_empty() {
            return Ok(false);
        }
        let context = Self::context(RepositoryOperation::Query);
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM ai_jobs WHERE status IN ({}))",
            Self::placeholders(1, statuses.len())
        );
        let mut query = sqlx::query_scalar::<_, bool>(&sql);
        for status in statuses {
            query = query.bind(*status);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| context.database_error(e))
    }

    async fn find_oldest(
        &self,
        statuses: &[JobStatus],
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Option<Job>> {
        if statuses.is_empty() {
            return Ok(None);
        }
        let context = Self::context(RepositoryOperation::Query)
            .with_additional_info(format!("状态: {statuses:?}, 种类: {kind:?}"));

        let mut sql = format!(
            "SELECT {JOB_COLUMNS} FROM ai_jobs WHERE status IN ({})",
            Self::placeholders(1, statuses.len())
        );
        if kind.is_some() {
            sql.push_str(&format!(" AND kind = ?{}", statuses.len() + 1));
        }
        sql.push_str(&format!(" ORDER BY started_at ASC, {KIND_ORDER}, id ASC LIMIT 1"));

        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(*status);
        }
        if let Some(kind) = kind {
            query = query.bind(kind);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;
        row.map(|row| Self::row_to_job(&row)).transpose()
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Vec<Job>> {
        let context = Self::context(RepositoryOperation::Query)
            .with_additional_info(format!("状态: {status}"));
        let mut sql = format!("SELECT {JOB_COLUMNS} FROM ai_jobs WHERE status = ?1");
        if kind.is_some() {
            sql.push_str(" AND kind = ?2");
        }
        sql.push_str(&format!(" ORDER BY started_at ASC, {KIND_ORDER}, id ASC"));

        let mut query = sqlx::query(&sql).bind(status);
        if let Some(kind) = kind {
            query = query.bind(kind);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn find_processing_started_before(
        &self,
        kind: JobKind,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Job>> {
        let context = Self::context(RepositoryOperation::Query).with_kind(kind);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM ai_jobs \
             WHERE kind = ?1 AND status = ?2 AND started_at < ?3 ORDER BY started_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(kind)
            .bind(JobStatus::Processing)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> OrchestratorResult<bool> {
        let context = Self::context(RepositoryOperation::Claim).with_id(id);
        let result = sqlx::query(
            r#"
            UPDATE ai_jobs
            SET status = ?2, started_at = ?3, error_message = NULL
            WHERE id = ?1
              AND status = ?4
              AND NOT EXISTS (SELECT 1 FROM ai_jobs WHERE status = ?2)
            "#,
        )
        .bind(id)
        .bind(JobStatus::Processing)
        .bind(now)
        .bind(JobStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        let claimed = result.rows_affected() == 1;
        if claimed {
            context.log_success(None);
        } else {
            debug!("任务 {} 认领失败：已被处理或存在其他处理中的任务", id);
        }
        Ok(claimed)
    }

    async fn set_external_job_id(&self, id: i64, external_job_id: &str) -> OrchestratorResult<()> {
        let context = Self::context(RepositoryOperation::Update).with_id(id);
        sqlx::query("UPDATE ai_jobs SET external_job_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(external_job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_progress(
        &self,
        id: i64,
        processed_units: i64,
        failed_units: i64,
    ) -> OrchestratorResult<()> {
        let context = Self::context(RepositoryOperation::Update).with_id(id);
        sqlx::query(
            r#"
            UPDATE ai_jobs
            SET processed_units = MAX(processed_units, MIN(?2, total_units)),
                failed_units = MAX(failed_units, ?3)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(processed_units)
        .bind(failed_units)
        .execute(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        context.log_success(Some(&format!(
            "已处理: {processed_units}, 失败: {failed_units}"
        )));
        Ok(())
    }

    async fn record_error(&self, id: i64, message: &str) -> OrchestratorResult<()> {
        let context = Self::context(RepositoryOperation::Update).with_id(id);
        sqlx::query("UPDATE ai_jobs SET error_message = ?2 WHERE id = ?1")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;
        Ok(())
    }

    #[instrument(skip(self, error_message))]
    async fn finish(
        &self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> OrchestratorResult<bool> {
        let context = Self::context(RepositoryOperation::Finish).with_id(id);
        let result = sqlx::query(
            r#"
            UPDATE ai_jobs
            SET status = ?2,
                error_message = ?3,
                completed_at = ?4,
                processed_units = CASE WHEN ?2 = 'COMPLETED' THEN total_units ELSE processed_units END
            WHERE id = ?1 AND status IN (?5, ?6)
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .bind(completed_at)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Processing)
        .execute(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        let finished = result.rows_affected() == 1;
        if finished {
            context.log_success(Some(&format!("终态: {status}")));
        } else {
            debug!("任务 {} 已处于终态，忽略 {} 写入", id, status);
        }
        Ok(finished)
    }

    async fn reset_to_pending(&self, id: i64, message: &str) -> OrchestratorResult<bool> {
        let context = Self::context(RepositoryOperation::Update).with_id(id);
        let result = sqlx::query(
            "UPDATE ai_jobs SET status = ?2, error_message = ?3 WHERE id = ?1 AND status = ?4",
        )
        .bind(id)
        .bind(JobStatus::Pending)
        .bind(message)
        .bind(JobStatus::Processing)
        .execute(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        Ok(result.rows_affected() == 1)
    }
}
