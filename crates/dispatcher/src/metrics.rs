//! 编排指标，通过 `metrics` 门面上报

use aijob_domain::{JobKind, JobStatus, OrchestratorError};
use metrics::counter;

pub fn record_job_finished(kind: JobKind, status: JobStatus) {
    counter!(
        "aijob_jobs_finished_total",
        "kind" => kind.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// `outcome` 取值：succeeded / retried / failed / skipped
pub fn record_batch(outcome: &'static str) {
    counter!("aijob_batches_total", "outcome" => outcome).increment(1);
}

/// 批次提交错误，按错误分类计数
pub fn record_batch_error(err: &OrchestratorError) {
    counter!("aijob_batch_errors_total", "category" => err.category()).increment(1);
}

pub fn record_watchdog_recovered(count: usize) {
    counter!("aijob_watchdog_recovered_total").increment(count as u64);
}
