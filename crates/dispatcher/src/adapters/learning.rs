use std::collections::BTreeMap;
use std::sync::Arc;

use aijob_core::RemoteServiceConfig;
use aijob_domain::{
    Job, JobKind, OrchestratorError, OrchestratorResult, RecordRepository, Taxonomy,
    TaxonomyRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::info;

use super::PayloadBuilder;

/// 把上次学习之后新增的人工标注按记录分组提交
pub struct LearningPayload {
    record_repo: Arc<dyn RecordRepository>,
    taxonomy_repo: Arc<dyn TaxonomyRepository>,
}

impl LearningPayload {
    pub fn new(
        record_repo: Arc<dyn RecordRepository>,
        taxonomy_repo: Arc<dyn TaxonomyRepository>,
    ) -> Self {
        Self {
            record_repo,
            taxonomy_repo,
        }
    }
}

#[async_trait]
impl PayloadBuilder for LearningPayload {
    fn kind(&self) -> JobKind {
        JobKind::Learning
    }

    fn submit_path<'a>(&self, remote: &'a RemoteServiceConfig) -> &'a str {
        &remote.learning_path
    }

    async fn build_payload(&self, job: &Job, taxonomy: &Taxonomy) -> OrchestratorResult<Value> {
        let annotations = self
            .record_repo
            .annotations_since(taxonomy.id, taxonomy.last_learned_at)
            .await?;
        if annotations.is_empty() {
            return Err(OrchestratorError::data("没有新的人工标注可供学习"));
        }

        let count = annotations.len();
        let mut by_record: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
        for annotation in annotations {
            by_record
                .entry(annotation.record_id)
                .or_default()
                .push(json!({ "node_id": annotation.node_id, "label": annotation.label }));
        }
        info!("学习任务 {} 包含 {} 条记录的 {} 条标注", job.id, by_record.len(), count);

        let records: Vec<Value> = by_record
            .into_iter()
            .map(|(record_id, labels)| json!({ "record_id": record_id, "labels": labels }))
            .collect();
        Ok(json!({
            "taxonomy_id": taxonomy.id,
            "job_id": job.id,
            "records": records,
        }))
    }

    async fn on_success(
        &self,
        job: &Job,
        snapshot_at: DateTime<Utc>,
        _result: &Value,
    ) -> OrchestratorResult<()> {
        self.taxonomy_repo
            .set_last_learned_at(job.taxonomy_id, snapshot_at)
            .await
    }
}
