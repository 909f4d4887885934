//! 测试数据构建器

use std::collections::BTreeMap;

use aijob_domain::{
    Annotation, ColumnMapping, Job, JobKind, JobPayload, JobStateCache, JobStatus,
    LabelingRecord, Taxonomy, TaxonomyNode,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// 任务构建器，默认是分类体系 1 上的待处理批量标注任务
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        let mut job = Job::bulk_labeling(1, vec![1, 2, 3]);
        job.id = 1;
        Self { job }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy_id: i64) -> Self {
        self.job.taxonomy_id = taxonomy_id;
        self
    }

    pub fn with_payload(mut self, payload: JobPayload) -> Self {
        self.job.kind = payload.kind();
        self.job.total_units = payload.record_ids().len() as i64;
        self.job.payload = payload;
        self
    }

    pub fn with_record_ids(self, record_ids: Vec<i64>) -> Self {
        self.with_payload(JobPayload::BulkLabeling { record_ids })
    }

    pub fn learning(self) -> Self {
        self.with_payload(JobPayload::Learning)
    }

    pub fn taxonomy_sync(self) -> Self {
        self.with_payload(JobPayload::TaxonomySync)
    }

    pub fn external_training(self, training_file: &str) -> Self {
        self.with_payload(JobPayload::ExternalTraining {
            training_file: training_file.to_string(),
        })
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.job.started_at = started_at;
        self
    }

    pub fn with_progress(mut self, processed_units: i64, failed_units: i64) -> Self {
        self.job.processed_units = processed_units;
        self.job.failed_units = failed_units;
        self
    }

    pub fn with_external_job_id(mut self, external_job_id: &str) -> Self {
        self.job.external_job_id = Some(external_job_id.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaxonomyBuilder {
    taxonomy: Taxonomy,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self {
            taxonomy: Taxonomy {
                id: 1,
                name: "测试分类体系".to_string(),
                is_active: true,
                sync_state: None,
                learning_state: None,
                last_learned_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.taxonomy.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.taxonomy.name = name.to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.taxonomy.is_active = false;
        self
    }

    pub fn with_last_learned_at(mut self, at: DateTime<Utc>) -> Self {
        self.taxonomy.last_learned_at = Some(at);
        self
    }

    pub fn with_job_state(mut self, kind: JobKind, state: JobStateCache) -> Self {
        match kind {
            JobKind::TaxonomySync => self.taxonomy.sync_state = Some(state),
            JobKind::Learning => self.taxonomy.learning_state = Some(state),
            _ => {}
        }
        self
    }

    pub fn build(self) -> Taxonomy {
        self.taxonomy
    }
}

impl Default for TaxonomyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 记录构建器，默认带一列 `text`
pub struct RecordBuilder {
    record: LabelingRecord,
}

impl RecordBuilder {
    pub fn new(id: i64) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert("text".to_string(), Value::String(format!("记录 {id} 的内容")));
        Self {
            record: LabelingRecord {
                id,
                dataset_id: 1,
                taxonomy_id: 1,
                columns,
            },
        }
    }

    pub fn with_dataset(mut self, dataset_id: i64) -> Self {
        self.record.dataset_id = dataset_id;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy_id: i64) -> Self {
        self.record.taxonomy_id = taxonomy_id;
        self
    }

    pub fn with_column(mut self, name: &str, value: Value) -> Self {
        self.record.columns.insert(name.to_string(), value);
        self
    }

    /// 所有列为空，构建出的载荷为空
    pub fn blank(mut self) -> Self {
        for value in self.record.columns.values_mut() {
            *value = Value::String(String::new());
        }
        self
    }

    pub fn build(self) -> LabelingRecord {
        self.record
    }
}

/// `text` 列映射为 `内容`
pub fn text_mapping(dataset_id: i64) -> ColumnMapping {
    ColumnMapping {
        dataset_id,
        column_name: "text".to_string(),
        display_name: "内容".to_string(),
        position: 1,
    }
}

pub fn node(id: i64, taxonomy_id: i64, parent_id: Option<i64>, name: &str) -> TaxonomyNode {
    TaxonomyNode {
        id,
        taxonomy_id,
        parent_id,
        name: name.to_string(),
        synonyms: vec![],
    }
}

pub fn annotation(
    id: i64,
    record_id: i64,
    taxonomy_id: i64,
    node_id: i64,
    created_at: DateTime<Utc>,
) -> Annotation {
    Annotation {
        id,
        record_id,
        taxonomy_id,
        node_id,
        label: format!("节点{node_id}"),
        created_at,
    }
}
