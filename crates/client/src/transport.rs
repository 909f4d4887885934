use aijob_core::OrchestratorResult;
use async_trait::async_trait;
use serde_json::Value;

/// 与外部任务服务交互的最小传输接口
///
/// 实现负责地址拼接、鉴权以及把非成功响应转换为 `OrchestratorError::Remote`。
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn post_json(&self, path: &str, body: &Value) -> OrchestratorResult<Value>;

    async fn get_json(&self, path: &str) -> OrchestratorResult<Value>;
}
