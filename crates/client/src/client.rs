use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use aijob_core::{OrchestratorError, OrchestratorResult, RemoteServiceConfig};
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::status::{normalize_status, RemoteStatus};
use crate::transport::JobTransport;

/// 外部服务返回任务句柄时可能使用的字段名
const HANDLE_FIELDS: [&str; 2] = ["job_id", "jobId"];

/// 外部任务客户端：提交、轮询与后台监控
#[derive(Clone)]
pub struct ExternalJobClient {
    transport: Arc<dyn JobTransport>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl ExternalJobClient {
    pub fn new(transport: Arc<dyn JobTransport>, config: &RemoteServiceConfig) -> Self {
        Self {
            transport,
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, poll_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.poll_timeout = poll_timeout;
        self
    }

    /// 提交任务并返回外部任务句柄
    pub async fn submit(&self, path: &str, payload: &Value) -> OrchestratorResult<String> {
        let response = self.transport.post_json(path, payload).await?;
        let handle = extract_handle(&response).ok_or_else(|| {
            OrchestratorError::Serialization(format!("外部服务响应缺少任务句柄: {response}"))
        })?;
        info!("外部任务已提交: {} -> {}", path, handle);
        Ok(handle)
    }

    /// 轮询直至终态或超时
    ///
    /// 成功时返回最后一次状态响应的完整内容。单次查询失败会被容忍，
    /// 只有整体超时时才把最后一次错误附在超时信息中返回。
    pub async fn poll_until_terminal(
        &self,
        handle: &str,
        status_path: &str,
    ) -> OrchestratorResult<Value> {
        let path = status_path.replace("{job_id}", handle);
        let deadline = Instant::now() + self.poll_timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let last_error = match self.transport.get_json(&path).await {
                Ok(body) => {
                    let raw = body.get("status").and_then(Value::as_str).unwrap_or_default();
                    match normalize_status(raw) {
                        RemoteStatus::Success => {
                            debug!("外部任务 {} 成功，共轮询 {} 次", handle, attempts);
                            return Ok(body);
                        }
                        RemoteStatus::Failure => {
                            let message = failure_message(&body, raw);
                            warn!("外部任务 {} 失败: {}", handle, message);
                            return Err(OrchestratorError::RemoteJobFailed(message));
                        }
                        RemoteStatus::Running => {
                            debug!("外部任务 {} 仍在运行 (状态: {})", handle, raw);
                        }
                    }
                    None
                }
                Err(e) => {
                    warn!("轮询外部任务 {} 失败，将继续重试: {}", handle, e);
                    Some(e)
                }
            };

            let now = Instant::now();
            if now >= deadline {
                let message = match last_error {
                    Some(e) => format!(
                        "外部任务 {handle} 在 {}s 内未结束，最后一次错误: {e}",
                        self.poll_timeout.as_secs()
                    ),
                    None => format!(
                        "外部任务 {handle} 在 {}s 内未结束",
                        self.poll_timeout.as_secs()
                    ),
                };
                return Err(OrchestratorError::Timeout(message));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// 在后台轮询外部任务，结束后恰好调用一次 `on_result`
    ///
    /// 轮询过程中的 panic 会被转换为 `OrchestratorError::Internal` 交给同一个回调。
    pub fn spawn_monitor<F, Fut>(
        &self,
        handle: String,
        status_path: String,
        on_result: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(OrchestratorResult<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(client.poll_until_terminal(&handle, &status_path))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let reason = panic_message(panic.as_ref());
                    error!("外部任务 {} 的监控发生异常: {}", handle, reason);
                    Err(OrchestratorError::internal(format!("监控异常: {reason}")))
                });
            on_result(result).await;
        })
    }
}

fn extract_handle(response: &Value) -> Option<String> {
    HANDLE_FIELDS.iter().find_map(|field| match response.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn failure_message(body: &Value, raw_status: &str) -> String {
    match body.get("error") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        _ => format!("外部任务状态为 {raw_status}"),
    }
}

/// 提取 panic 负载中的文字说明
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知异常".to_string()
    }
}
