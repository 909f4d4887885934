use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务种类，创建后不可变更
///
/// 声明顺序即跨种类排队时的平局裁决顺序。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    #[serde(rename = "BULK_LABELING")]
    BulkLabeling,
    #[serde(rename = "LEARNING")]
    Learning,
    #[serde(rename = "TAXONOMY_SYNC")]
    TaxonomySync,
    #[serde(rename = "EXTERNAL_TRAINING")]
    ExternalTraining,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::BulkLabeling,
        JobKind::Learning,
        JobKind::TaxonomySync,
        JobKind::ExternalTraining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::BulkLabeling => "BULK_LABELING",
            JobKind::Learning => "LEARNING",
            JobKind::TaxonomySync => "TAXONOMY_SYNC",
            JobKind::ExternalTraining => "EXTERNAL_TRAINING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BULK_LABELING" => Some(JobKind::BulkLabeling),
            "LEARNING" => Some(JobKind::Learning),
            "TAXONOMY_SYNC" => Some(JobKind::TaxonomySync),
            "EXTERNAL_TRAINING" => Some(JobKind::ExternalTraining),
            _ => None,
        }
    }

    /// 平局裁决序号
    pub fn rank(&self) -> u8 {
        match self {
            JobKind::BulkLabeling => 0,
            JobKind::Learning => 1,
            JobKind::TaxonomySync => 2,
            JobKind::ExternalTraining => 3,
        }
    }

    /// 该种类的当前任务状态是否缓存在分类体系上
    pub fn is_tracked_on_taxonomy(&self) -> bool {
        matches!(self, JobKind::Learning | JobKind::TaxonomySync)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        JobKind::parse(s).ok_or_else(|| format!("Invalid job kind: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务状态
///
/// 合法迁移：PENDING → PROCESSING → {COMPLETED, FAILED, CANCELLED}；
/// PROCESSING → PENDING 仅由看门狗恢复触发。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl JobStatus {
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            "CANCELLED" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        JobStatus::parse(s).ok_or_else(|| format!("Invalid job status: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 各种类任务的专属数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// 创建时冻结的记录ID列表，源数据集后续变更不影响任务范围
    BulkLabeling { record_ids: Vec<i64> },
    Learning,
    TaxonomySync,
    /// 已上传训练文件的引用
    ExternalTraining { training_file: String },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::BulkLabeling { .. } => JobKind::BulkLabeling,
            JobPayload::Learning => JobKind::Learning,
            JobPayload::TaxonomySync => JobKind::TaxonomySync,
            JobPayload::ExternalTraining { .. } => JobKind::ExternalTraining,
        }
    }

    pub fn record_ids(&self) -> &[i64] {
        match self {
            JobPayload::BulkLabeling { record_ids } => record_ids,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    pub status: JobStatus,
    pub taxonomy_id: i64,
    pub payload: JobPayload,
    pub external_job_id: Option<String>,
    pub total_units: i64,
    pub processed_units: i64,
    pub failed_units: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 创建时写入作为排队顺序键，被认领时刷新
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(taxonomy_id: i64, payload: JobPayload) -> Self {
        let now = Utc::now();
        let total_units = payload.record_ids().len() as i64;
        Self {
            id: 0, // 将由数据库生成
            kind: payload.kind(),
            status: JobStatus::Pending,
            taxonomy_id,
            payload,
            external_job_id: None,
            total_units,
            processed_units: 0,
            failed_units: 0,
            error_message: None,
            created_at: now,
            started_at: now,
            completed_at: None,
        }
    }

    pub fn bulk_labeling(taxonomy_id: i64, record_ids: Vec<i64>) -> Self {
        Self::new(taxonomy_id, JobPayload::BulkLabeling { record_ids })
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn record_ids(&self) -> &[i64] {
        self.payload.record_ids()
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 (ID: {}, 种类: {}, 分类体系: {})",
            self.id, self.kind, self.taxonomy_id
        )
    }
}

/// 分类体系上缓存的"当前任务"状态，仅用于快速展示
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStateCache {
    pub job_id: i64,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStateCache {
    pub fn of(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            error_message: job.error_message.clone(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub sync_state: Option<JobStateCache>,
    pub learning_state: Option<JobStateCache>,
    pub last_learned_at: Option<DateTime<Utc>>,
}

impl Taxonomy {
    pub fn job_state(&self, kind: JobKind) -> Option<&JobStateCache> {
        match kind {
            JobKind::TaxonomySync => self.sync_state.as_ref(),
            JobKind::Learning => self.learning_state.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyNode {
    pub id: i64,
    pub taxonomy_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub synonyms: Vec<String>,
}

/// 待标注的文本记录，列值按原始列名存放
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingRecord {
    pub id: i64,
    pub dataset_id: i64,
    pub taxonomy_id: i64,
    pub columns: BTreeMap<String, serde_json::Value>,
}

/// 数据集列名到展示名的映射
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMapping {
    pub dataset_id: i64,
    pub column_name: String,
    pub display_name: String,
    pub position: i32,
}

/// 用户对记录的人工标注
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub record_id: i64,
    pub taxonomy_id: i64,
    pub node_id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_labeling_job_freezes_record_ids() {
        let job = Job::bulk_labeling(7, vec![1, 2, 3]);
        assert_eq!(job.kind, JobKind::BulkLabeling);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_units, 3);
        assert_eq!(job.record_ids(), &[1, 2, 3]);
    }

    #[test]
    fn non_bulk_jobs_have_no_units() {
        let job = Job::new(
            7,
            JobPayload::ExternalTraining {
                training_file: "s3://bucket/train.jsonl".to_string(),
            },
        );
        assert_eq!(job.kind, JobKind::ExternalTraining);
        assert_eq!(job.total_units, 0);
        assert!(job.record_ids().is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn kind_rank_follows_declaration_order() {
        let mut kinds = JobKind::ALL.to_vec();
        kinds.reverse();
        kinds.sort_by_key(|k| k.rank());
        assert_eq!(kinds, JobKind::ALL.to_vec());
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = JobPayload::BulkLabeling {
            record_ids: vec![4, 5],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "bulk_labeling");
        assert_eq!(value["record_ids"], serde_json::json!([4, 5]));

        let sync: JobPayload = serde_json::from_str(r#"{"type":"taxonomy_sync"}"#).unwrap();
        assert_eq!(sync.kind(), JobKind::TaxonomySync);
    }
}
