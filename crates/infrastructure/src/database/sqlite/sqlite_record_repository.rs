use std::collections::BTreeMap;

use aijob_core::OrchestratorResult;
use aijob_domain::{Annotation, ColumnMapping, LabelingRecord, RecordRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::error_handling::{OperationContext, RepositoryOperation};

pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<LabelingRecord> {
        let columns_json: String = row.try_get("columns")?;
        let columns: BTreeMap<String, serde_json::Value> = serde_json::from_str(&columns_json)?;
        Ok(LabelingRecord {
            id: row.try_get("id")?,
            dataset_id: row.try_get("dataset_id")?,
            taxonomy_id: row.try_get("taxonomy_id")?,
            columns,
        })
    }
}

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_by_ids(&self, ids: &[i64]) -> OrchestratorResult<Vec<LabelingRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let context = OperationContext::new(RepositoryOperation::BatchRead, "标注记录")
            .with_additional_info(format!("批量查询{}条记录", ids.len()));

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT id, dataset_id, taxonomy_id, columns FROM records WHERE id IN ({}) ORDER BY id",
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn get_column_mappings(&self, dataset_id: i64) -> OrchestratorResult<Vec<ColumnMapping>> {
        let context =
            OperationContext::new(RepositoryOperation::Query, "列映射").with_id(dataset_id);
        let rows = sqlx::query(
            "SELECT dataset_id, column_name, display_name, position FROM column_mappings \
             WHERE dataset_id = ?1 ORDER BY position, column_name",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnMapping {
                    dataset_id: row.try_get("dataset_id")?,
                    column_name: row.try_get("column_name")?,
                    display_name: row.try_get("display_name")?,
                    position: row.try_get("position")?,
                })
            })
            .collect()
    }

    async fn save_suggestions(
        &self,
        record_id: i64,
        job_id: i64,
        suggestions: &serde_json::Value,
    ) -> OrchestratorResult<()> {
        let context =
            OperationContext::new(RepositoryOperation::Update, "标注记录").with_id(record_id);
        let suggestions_json =
            serde_json::to_string(suggestions).map_err(|e| context.serialization_error(e))?;

        sqlx::query(
            "UPDATE records SET ai_suggestions = ?2, suggested_by_job_id = ?3 WHERE id = ?1",
        )
        .bind(record_id)
        .bind(suggestions_json)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;
        Ok(())
    }

    async fn annotations_since(
        &self,
        taxonomy_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Vec<Annotation>> {
        let context =
            OperationContext::new(RepositoryOperation::Query, "人工标注").with_id(taxonomy_id);
        let rows = sqlx::query(
            "SELECT id, record_id, taxonomy_id, node_id, label, created_at FROM annotations \
             WHERE taxonomy_id = ?1 AND (?2 IS NULL OR created_at > ?2) \
             ORDER BY record_id, created_at, id",
        )
        .bind(taxonomy_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        rows.iter()
            .map(|row| {
                Ok(Annotation {
                    id: row.try_get("id")?,
                    record_id: row.try_get("record_id")?,
                    taxonomy_id: row.try_get("taxonomy_id")?,
                    node_id: row.try_get("node_id")?,
                    label: row.try_get("label")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::database::DatabaseManager;

    async fn repository() -> (DatabaseManager, SqliteRecordRepository) {
        let manager = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteRecordRepository::new(manager.pool().clone());
        (manager, repo)
    }

    #[tokio::test]
    async fn missing_records_are_not_returned() {
        let (db, repo) = repository().await;
        sqlx::query(
            "INSERT INTO records (id, dataset_id, taxonomy_id, columns) VALUES \
             (1, 7, 1, '{\"body\":\"包裹破损\"}'), (2, 7, 1, '{\"body\":\"\"}')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let records = repo.get_by_ids(&[1, 2, 3]).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].columns["body"], json!("包裹破损"));
        assert!(repo.get_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suggestions_are_stored_with_job_id() {
        let (db, repo) = repository().await;
        sqlx::query("INSERT INTO records (id, dataset_id, taxonomy_id) VALUES (1, 7, 1)")
            .execute(db.pool())
            .await
            .unwrap();

        let suggestions = json!([{"node_id": 10, "score": 0.92}]);
        repo.save_suggestions(1, 42, &suggestions).await.unwrap();

        let row = sqlx::query("SELECT ai_suggestions, suggested_by_job_id FROM records WHERE id = 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let stored: String = row.get("ai_suggestions");
        let job_id: i64 = row.get("suggested_by_job_id");
        assert_eq!(serde_json::from_str::<serde_json::Value>(&stored).unwrap(), suggestions);
        assert_eq!(job_id, 42);
    }

    #[tokio::test]
    async fn column_mappings_are_ordered_by_position() {
        let (db, repo) = repository().await;
        sqlx::query(
            "INSERT INTO column_mappings (dataset_id, column_name, display_name, position) VALUES \
             (7, 'c2', '渠道', 2), (7, 'c1', '内容', 1), (8, 'c1', '其他', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mappings = repo.get_column_mappings(7).await.unwrap();
        let names: Vec<_> = mappings.iter().map(|m| m.display_name.as_str()).collect();
        assert_eq!(names, vec!["内容", "渠道"]);
    }

    #[tokio::test]
    async fn annotations_since_filters_by_time() {
        let (db, repo) = repository().await;
        let old = Utc::now() - Duration::days(3);
        let recent = Utc::now() - Duration::hours(1);
        for (record_id, created_at) in [(1, old), (2, recent)] {
            sqlx::query(
                "INSERT INTO annotations (record_id, taxonomy_id, node_id, label, created_at) \
                 VALUES (?1, 1, 10, '物流', ?2)",
            )
            .bind(record_id)
            .bind(created_at)
            .execute(db.pool())
            .await
            .unwrap();
        }

        assert_eq!(repo.annotations_since(1, None).await.unwrap().len(), 2);
        let fresh = repo
            .annotations_since(1, Some(Utc::now() - Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].record_id, 2);
    }
}
