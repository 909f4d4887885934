use aijob_core::OrchestratorResult;
use aijob_domain::{JobKind, JobStateCache, JobStatus, Taxonomy, TaxonomyNode, TaxonomyRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{OperationContext, RepositoryOperation};

pub struct SqliteTaxonomyRepository {
    pool: SqlitePool,
}

impl SqliteTaxonomyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 缓存列前缀；只有学习与同步两种任务缓存在分类体系上
    fn cache_prefix(kind: JobKind) -> Option<&'static str> {
        match kind {
            JobKind::TaxonomySync => Some("sync"),
            JobKind::Learning => Some("learning"),
            _ => None,
        }
    }

    fn read_cache(
        row: &sqlx::sqlite::SqliteRow,
        prefix: &str,
    ) -> OrchestratorResult<Option<JobStateCache>> {
        let job_id: Option<i64> = row.try_get(format!("{prefix}_job_id").as_str())?;
        let status: Option<JobStatus> = row.try_get(format!("{prefix}_status").as_str())?;
        let (Some(job_id), Some(status)) = (job_id, status) else {
            return Ok(None);
        };
        let updated_at: Option<DateTime<Utc>> =
            row.try_get(format!("{prefix}_updated_at").as_str())?;

        Ok(Some(JobStateCache {
            job_id,
            status,
            error_message: row.try_get(format!("{prefix}_error").as_str())?,
            updated_at: updated_at.unwrap_or_else(Utc::now),
        }))
    }

    fn row_to_taxonomy(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Taxonomy> {
        Ok(Taxonomy {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_active: row.try_get("is_active")?,
            sync_state: Self::read_cache(row, "sync")?,
            learning_state: Self::read_cache(row, "learning")?,
            last_learned_at: row.try_get("last_learned_at")?,
        })
    }

    fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<TaxonomyNode> {
        let synonyms_json: String = row.try_get("synonyms")?;
        Ok(TaxonomyNode {
            id: row.try_get("id")?,
            taxonomy_id: row.try_get("taxonomy_id")?,
            parent_id: row.try_get("parent_id")?,
            name: row.try_get("name")?,
            synonyms: serde_json::from_str(&synonyms_json)?,
        })
    }
}

#[async_trait]
impl TaxonomyRepository for SqliteTaxonomyRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Taxonomy>> {
        let context = OperationContext::new(RepositoryOperation::Read, "分类体系").with_id(id);
        let row = sqlx::query("SELECT * FROM taxonomies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        row.map(|row| Self::row_to_taxonomy(&row)).transpose()
    }

    async fn get_nodes(&self, taxonomy_id: i64) -> OrchestratorResult<Vec<TaxonomyNode>> {
        let context =
            OperationContext::new(RepositoryOperation::Query, "分类节点").with_id(taxonomy_id);
        let rows = sqlx::query(
            "SELECT id, taxonomy_id, parent_id, name, synonyms FROM taxonomy_nodes \
             WHERE taxonomy_id = ?1 ORDER BY id",
        )
        .bind(taxonomy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        rows.iter().map(Self::row_to_node).collect()
    }

    #[instrument(skip(self, state), fields(job_id = state.job_id, status = %state.status))]
    async fn set_job_state(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<()> {
        let Some(prefix) = Self::cache_prefix(kind) else {
            return Ok(());
        };
        let context = OperationContext::new(RepositoryOperation::Update, "分类体系")
            .with_id(taxonomy_id)
            .with_kind(kind);

        let sql = format!(
            "UPDATE taxonomies SET {prefix}_job_id = ?2, {prefix}_status = ?3, \
             {prefix}_error = ?4, {prefix}_updated_at = ?5 WHERE id = ?1"
        );
        sqlx::query(&sql)
            .bind(taxonomy_id)
            .bind(state.job_id)
            .bind(state.status)
            .bind(&state.error_message)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        context.log_success(Some(&format!("当前任务: {}", state.job_id)));
        Ok(())
    }

    #[instrument(skip(self, state), fields(job_id = state.job_id, status = %state.status))]
    async fn update_job_state_if_current(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<bool> {
        let Some(prefix) = Self::cache_prefix(kind) else {
            return Ok(false);
        };
        let context = OperationContext::new(RepositoryOperation::Update, "分类体系")
            .with_id(taxonomy_id)
            .with_kind(kind);

        let sql = format!(
            "UPDATE taxonomies SET {prefix}_status = ?3, {prefix}_error = ?4, \
             {prefix}_updated_at = ?5 WHERE id = ?1 AND {prefix}_job_id = ?2"
        );
        let result = sqlx::query(&sql)
            .bind(taxonomy_id)
            .bind(state.job_id)
            .bind(state.status)
            .bind(&state.error_message)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        let updated = result.rows_affected() == 1;
        if !updated {
            debug!(
                "分类体系 {} 的{}缓存已指向其他任务，跳过任务 {} 的状态写入",
                taxonomy_id, kind, state.job_id
            );
        }
        Ok(updated)
    }

    async fn set_last_learned_at(
        &self,
        taxonomy_id: i64,
        learned_at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let context =
            OperationContext::new(RepositoryOperation::Update, "分类体系").with_id(taxonomy_id);
        sqlx::query("UPDATE taxonomies SET last_learned_at = ?2 WHERE id = ?1")
            .bind(taxonomy_id)
            .bind(learned_at)
            .execute(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;
        Ok(())
    }
}
