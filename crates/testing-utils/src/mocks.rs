//! 仓储接口的内存实现
//!
//! 语义与 SQLite 实现保持一致（条件认领、终态保护、进度封顶），
//! 另外记录每次写入以便断言调用次数。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use aijob_core::{OrchestratorError, OrchestratorResult};
use aijob_domain::{
    Annotation, ColumnMapping, Job, JobKind, JobRepository, JobStateCache, JobStatus,
    LabelingRecord, RecordRepository, Taxonomy, TaxonomyNode, TaxonomyRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// 内存任务仓储
#[derive(Debug, Clone)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, Job>>>,
    next_id: Arc<Mutex<i64>>,
    progress_updates: Arc<Mutex<Vec<(i64, i64, i64)>>>,
    recorded_errors: Arc<Mutex<Vec<(i64, String)>>>,
    claim_failures: Arc<Mutex<VecDeque<OrchestratorError>>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            progress_updates: Arc::new(Mutex::new(Vec::new())),
            recorded_errors: Arc::new(Mutex::new(Vec::new())),
            claim_failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let repo = Self::new();
        for job in jobs {
            repo.insert(job);
        }
        repo
    }

    /// 直接写入任务，保留给定ID
    pub fn insert(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        if job.id >= *next_id {
            *next_id = job.id + 1;
        }
        jobs.insert(job.id, job);
    }

    pub fn job(&self, id: i64) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// 模拟外部操作者直接改写状态
    pub fn set_status(&self, id: i64, status: JobStatus) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
        }
    }

    pub fn processing_count(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .count()
    }

    pub fn progress_updates(&self, id: i64) -> Vec<(i64, i64)> {
        self.progress_updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _, _)| *job_id == id)
            .map(|(_, processed, failed)| (*processed, *failed))
            .collect()
    }

    pub fn recorded_errors(&self, id: i64) -> Vec<String> {
        self.recorded_errors
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _)| *job_id == id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// 下一次认领直接返回该错误，任务状态不变
    pub fn fail_next_claim_with(&self, error: OrchestratorError) {
        self.claim_failures.lock().unwrap().push_back(error);
    }

    fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by_key(|j| (j.started_at, j.kind.rank(), j.id));
        jobs
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &Job) -> OrchestratorResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = job.clone();
        created.id = *next_id;
        *next_id += 1;
        jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Job>> {
        Ok(self.job(id))
    }

    async fn get_status(&self, id: i64) -> OrchestratorResult<Option<JobStatus>> {
        Ok(self.job(id).map(|j| j.status))
    }

    async fn exists_with_status(&self, statuses: &[JobStatus]) -> OrchestratorResult<bool> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .any(|j| statuses.contains(&j.status)))
    }

    async fn find_oldest(
        &self,
        statuses: &[JobStatus],
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Option<Job>> {
        let candidates: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| statuses.contains(&j.status) && kind.map_or(true, |k| j.kind == k))
            .cloned()
            .collect();
        Ok(Self::sorted(candidates).into_iter().next())
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        kind: Option<JobKind>,
    ) -> OrchestratorResult<Vec<Job>> {
        let jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == status && kind.map_or(true, |k| j.kind == k))
            .cloned()
            .collect();
        Ok(Self::sorted(jobs))
    }

    async fn find_processing_started_before(
        &self,
        kind: JobKind,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Job>> {
        let jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.kind == kind && j.status == JobStatus::Processing && j.started_at < cutoff)
            .cloned()
            .collect();
        Ok(Self::sorted(jobs))
    }

    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> OrchestratorResult<bool> {
        if let Some(err) = self.claim_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.values().any(|j| j.status == JobStatus::Processing) {
            return Ok(false);
        }
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = now;
                job.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_external_job_id(&self, id: i64, external_job_id: &str) -> OrchestratorResult<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.external_job_id = Some(external_job_id.to_string());
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        id: i64,
        processed_units: i64,
        failed_units: i64,
    ) -> OrchestratorResult<()> {
        self.progress_updates
            .lock()
            .unwrap()
            .push((id, processed_units, failed_units));
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.processed_units = job
                .processed_units
                .max(processed_units.min(job.total_units));
            job.failed_units = job.failed_units.max(failed_units);
        }
        Ok(())
    }

    async fn record_error(&self, id: i64, message: &str) -> OrchestratorResult<()> {
        self.recorded_errors
            .lock()
            .unwrap()
            .push((id, message.to_string()));
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> OrchestratorResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = status;
                job.error_message = error_message.map(str::to_string);
                job.completed_at = Some(completed_at);
                if status == JobStatus::Completed {
                    job.processed_units = job.total_units;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_to_pending(&self, id: i64, message: &str) -> OrchestratorResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Pending;
                job.error_message = Some(message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// 内存分类体系仓储
#[derive(Debug, Clone, Default)]
pub struct MockTaxonomyRepository {
    taxonomies: Arc<Mutex<HashMap<i64, Taxonomy>>>,
    nodes: Arc<Mutex<HashMap<i64, Vec<TaxonomyNode>>>>,
}

impl MockTaxonomyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_taxonomies(taxonomies: Vec<Taxonomy>) -> Self {
        let repo = Self::new();
        for taxonomy in taxonomies {
            repo.insert(taxonomy);
        }
        repo
    }

    pub fn insert(&self, taxonomy: Taxonomy) {
        self.taxonomies.lock().unwrap().insert(taxonomy.id, taxonomy);
    }

    pub fn add_node(&self, node: TaxonomyNode) {
        self.nodes
            .lock()
            .unwrap()
            .entry(node.taxonomy_id)
            .or_default()
            .push(node);
    }

    pub fn taxonomy(&self, id: i64) -> Option<Taxonomy> {
        self.taxonomies.lock().unwrap().get(&id).cloned()
    }

    fn cache_slot(taxonomy: &mut Taxonomy, kind: JobKind) -> Option<&mut Option<JobStateCache>> {
        match kind {
            JobKind::TaxonomySync => Some(&mut taxonomy.sync_state),
            JobKind::Learning => Some(&mut taxonomy.learning_state),
            _ => None,
        }
    }
}

#[async_trait]
impl TaxonomyRepository for MockTaxonomyRepository {
    async fn get_by_id(&self, id: i64) -> OrchestratorResult<Option<Taxonomy>> {
        Ok(self.taxonomy(id))
    }

    async fn get_nodes(&self, taxonomy_id: i64) -> OrchestratorResult<Vec<TaxonomyNode>> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(&taxonomy_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_job_state(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<()> {
        let mut taxonomies = self.taxonomies.lock().unwrap();
        if let Some(slot) = taxonomies
            .get_mut(&taxonomy_id)
            .and_then(|t| Self::cache_slot(t, kind))
        {
            *slot = Some(state.clone());
        }
        Ok(())
    }

    async fn update_job_state_if_current(
        &self,
        taxonomy_id: i64,
        kind: JobKind,
        state: &JobStateCache,
    ) -> OrchestratorResult<bool> {
        let mut taxonomies = self.taxonomies.lock().unwrap();
        let Some(slot) = taxonomies
            .get_mut(&taxonomy_id)
            .and_then(|t| Self::cache_slot(t, kind))
        else {
            return Ok(false);
        };
        match slot {
            Some(current) if current.job_id == state.job_id => {
                *current = state.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_last_learned_at(
        &self,
        taxonomy_id: i64,
        learned_at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        if let Some(taxonomy) = self.taxonomies.lock().unwrap().get_mut(&taxonomy_id) {
            taxonomy.last_learned_at = Some(learned_at);
        }
        Ok(())
    }
}

/// 内存标注记录仓储
#[derive(Debug, Clone, Default)]
pub struct MockRecordRepository {
    records: Arc<Mutex<HashMap<i64, LabelingRecord>>>,
    mappings: Arc<Mutex<Vec<ColumnMapping>>>,
    suggestions: Arc<Mutex<HashMap<i64, (i64, Value)>>>,
    annotations: Arc<Mutex<Vec<Annotation>>>,
}

impl MockRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: LabelingRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn remove(&self, id: i64) {
        self.records.lock().unwrap().remove(&id);
    }

    pub fn add_mapping(&self, mapping: ColumnMapping) {
        self.mappings.lock().unwrap().push(mapping);
    }

    pub fn add_annotation(&self, annotation: Annotation) {
        self.annotations.lock().unwrap().push(annotation);
    }

    /// 记录的建议结果及写入它的任务ID
    pub fn suggestion(&self, record_id: i64) -> Option<(i64, Value)> {
        self.suggestions.lock().unwrap().get(&record_id).cloned()
    }

    pub fn suggestion_count(&self) -> usize {
        self.suggestions.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordRepository for MockRecordRepository {
    async fn get_by_ids(&self, ids: &[i64]) -> OrchestratorResult<Vec<LabelingRecord>> {
        let records = self.records.lock().unwrap();
        let mut found: Vec<LabelingRecord> =
            ids.iter().filter_map(|id| records.get(id).cloned()).collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    async fn get_column_mappings(&self, dataset_id: i64) -> OrchestratorResult<Vec<ColumnMapping>> {
        let mut mappings: Vec<ColumnMapping> = self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.dataset_id == dataset_id)
            .cloned()
            .collect();
        mappings.sort_by_key(|m| m.position);
        Ok(mappings)
    }

    async fn save_suggestions(
        &self,
        record_id: i64,
        job_id: i64,
        suggestions: &Value,
    ) -> OrchestratorResult<()> {
        self.suggestions
            .lock()
            .unwrap()
            .insert(record_id, (job_id, suggestions.clone()));
        Ok(())
    }

    async fn annotations_since(
        &self,
        taxonomy_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Vec<Annotation>> {
        let mut annotations: Vec<Annotation> = self
            .annotations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.taxonomy_id == taxonomy_id && since.map_or(true, |s| a.created_at > s))
            .cloned()
            .collect();
        annotations.sort_by_key(|a| (a.record_id, a.created_at, a.id));
        Ok(annotations)
    }
}
