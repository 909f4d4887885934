use aijob_core::RemoteServiceConfig;
use aijob_domain::{Job, JobKind, JobPayload, OrchestratorError, OrchestratorResult, Taxonomy};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::PayloadBuilder;

/// 引用已上传的训练文件发起外部训练
#[derive(Default)]
pub struct ExternalTrainingPayload;

impl ExternalTrainingPayload {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PayloadBuilder for ExternalTrainingPayload {
    fn kind(&self) -> JobKind {
        JobKind::ExternalTraining
    }

    fn submit_path<'a>(&self, remote: &'a RemoteServiceConfig) -> &'a str {
        &remote.training_path
    }

    async fn build_payload(&self, job: &Job, taxonomy: &Taxonomy) -> OrchestratorResult<Value> {
        let training_file = match &job.payload {
            JobPayload::ExternalTraining { training_file } => training_file.trim(),
            other => {
                return Err(OrchestratorError::internal(format!(
                    "外部训练任务 {} 的载荷类型错误: {:?}",
                    job.id,
                    other.kind()
                )))
            }
        };
        if training_file.is_empty() {
            return Err(OrchestratorError::data("未指定训练文件"));
        }

        Ok(json!({
            "taxonomy_id": taxonomy.id,
            "job_id": job.id,
            "training_file": training_file,
        }))
    }
}
