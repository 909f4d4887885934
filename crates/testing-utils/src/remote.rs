//! 可编排行为的外部任务服务替身

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aijob_client::JobTransport;
use aijob_core::{OrchestratorError, OrchestratorResult};
use async_trait::async_trait;
use serde_json::{json, Value};

/// 每次提交后调用：`(提交序号, 路径, 请求体)`，序号从 1 开始
pub type SubmitHook = Arc<dyn Fn(usize, &str, &Value) + Send + Sync>;

#[derive(Default)]
struct FakeRemoteState {
    submissions: Mutex<Vec<(String, Value)>>,
    payloads: Mutex<HashMap<String, Value>>,
    submit_failures: Mutex<VecDeque<OrchestratorError>>,
    status_script: Mutex<VecDeque<OrchestratorResult<Value>>>,
    failed_records: Mutex<HashSet<i64>>,
    dropped_records: Mutex<HashSet<i64>>,
    job_failure: Mutex<Option<String>>,
    handle_field: Mutex<Option<&'static str>>,
    on_submit: Mutex<Option<SubmitHook>>,
    held: AtomicBool,
    submit_count: AtomicUsize,
    status_polls: AtomicUsize,
}

/// 内存中的外部服务
///
/// 默认行为：每次提交返回 `ext-<序号>` 句柄，状态查询立即成功；
/// 批量标注的结果为每条提交的记录生成一条建议。
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<FakeRemoteState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 `count` 次提交返回 HTTP `status` 错误
    pub fn fail_next_submits(&self, count: usize, status: u16) {
        let mut failures = self.state.submit_failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back(OrchestratorError::Remote {
                status,
                body: "injected failure".to_string(),
            });
        }
    }

    pub fn fail_next_submit_with(&self, error: OrchestratorError) {
        self.state.submit_failures.lock().unwrap().push_back(error);
    }

    /// 预设状态查询响应，优先于默认行为
    pub fn push_status(&self, response: OrchestratorResult<Value>) {
        self.state.status_script.lock().unwrap().push_back(response);
    }

    /// 结果中把该记录标为错误
    pub fn fail_record(&self, record_id: i64) {
        self.state.failed_records.lock().unwrap().insert(record_id);
    }

    /// 结果中省略该记录
    pub fn drop_record(&self, record_id: i64) {
        self.state.dropped_records.lock().unwrap().insert(record_id);
    }

    /// 所有外部任务以失败告终
    pub fn fail_jobs_with(&self, message: &str) {
        *self.state.job_failure.lock().unwrap() = Some(message.to_string());
    }

    /// 使用指定字段名返回句柄
    pub fn use_handle_field(&self, field: &'static str) {
        *self.state.handle_field.lock().unwrap() = Some(field);
    }

    pub fn on_submit(&self, hook: SubmitHook) {
        *self.state.on_submit.lock().unwrap() = Some(hook);
    }

    /// 让所有外部任务保持运行中，直到 `release`
    pub fn hold(&self) {
        self.state.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.state.held.store(false, Ordering::SeqCst);
    }

    pub fn submit_count(&self) -> usize {
        self.state.submit_count.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.state.status_polls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<(String, Value)> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn submissions_to(&self, path: &str) -> Vec<Value> {
        self.submissions()
            .into_iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body)
            .collect()
    }

    fn labeling_results(&self, payload: &Value) -> Value {
        let failed = self.state.failed_records.lock().unwrap().clone();
        let dropped = self.state.dropped_records.lock().unwrap().clone();
        let results: Vec<Value> = payload["records"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|record| record["record_id"].as_i64())
            .filter(|id| !dropped.contains(id))
            .map(|id| {
                if failed.contains(&id) {
                    json!({"record_id": id, "error": "record could not be classified"})
                } else {
                    json!({
                        "record_id": id,
                        "suggestions": [{"node_id": 1, "label": "物流", "score": 0.9}]
                    })
                }
            })
            .collect();
        json!({ "results": results })
    }
}

#[async_trait]
impl JobTransport for FakeRemote {
    async fn post_json(&self, path: &str, body: &Value) -> OrchestratorResult<Value> {
        let n = self.state.submit_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .submissions
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));

        let hook = self.state.on_submit.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(n, path, body);
        }

        if let Some(err) = self.state.submit_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let handle = format!("ext-{n}");
        self.state
            .payloads
            .lock()
            .unwrap()
            .insert(handle.clone(), body.clone());
        let field = self.state.handle_field.lock().unwrap().unwrap_or("job_id");
        Ok(json!({ field: handle }))
    }

    async fn get_json(&self, path: &str) -> OrchestratorResult<Value> {
        self.state.status_polls.fetch_add(1, Ordering::SeqCst);
        if self.state.held.load(Ordering::SeqCst) {
            return Ok(json!({"status": "running"}));
        }
        if let Some(response) = self.state.status_script.lock().unwrap().pop_front() {
            return response;
        }
        if let Some(message) = self.state.job_failure.lock().unwrap().clone() {
            return Ok(json!({"status": "failed", "error": message}));
        }

        let handle = path.rsplit('/').next().unwrap_or_default();
        let payload = self.state.payloads.lock().unwrap().get(handle).cloned();
        let result = match payload {
            Some(payload) if payload.get("records").is_some() => self.labeling_results(&payload),
            _ => json!({}),
        };
        Ok(json!({"status": "completed", "job_id": handle, "result": result}))
    }
}
