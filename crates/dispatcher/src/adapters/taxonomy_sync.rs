use std::sync::Arc;

use aijob_core::RemoteServiceConfig;
use aijob_domain::{Job, JobKind, OrchestratorError, OrchestratorResult, Taxonomy, TaxonomyRepository};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::PayloadBuilder;

/// 提交完整的分类体系节点树（含同义词）
pub struct TaxonomySyncPayload {
    taxonomy_repo: Arc<dyn TaxonomyRepository>,
}

impl TaxonomySyncPayload {
    pub fn new(taxonomy_repo: Arc<dyn TaxonomyRepository>) -> Self {
        Self { taxonomy_repo }
    }
}

#[async_trait]
impl PayloadBuilder for TaxonomySyncPayload {
    fn kind(&self) -> JobKind {
        JobKind::TaxonomySync
    }

    fn submit_path<'a>(&self, remote: &'a RemoteServiceConfig) -> &'a str {
        &remote.taxonomy_sync_path
    }

    async fn build_payload(&self, job: &Job, taxonomy: &Taxonomy) -> OrchestratorResult<Value> {
        let nodes = self.taxonomy_repo.get_nodes(taxonomy.id).await?;
        if nodes.is_empty() {
            return Err(OrchestratorError::data(format!(
                "分类体系 {} 没有任何节点",
                taxonomy.name
            )));
        }

        let nodes: Vec<Value> = nodes
            .into_iter()
            .map(|n| {
                json!({
                    "id": n.id,
                    "parent_id": n.parent_id,
                    "name": n.name,
                    "synonyms": n.synonyms,
                })
            })
            .collect();
        Ok(json!({
            "taxonomy_id": taxonomy.id,
            "taxonomy_name": taxonomy.name,
            "job_id": job.id,
            "nodes": nodes,
        }))
    }
}
