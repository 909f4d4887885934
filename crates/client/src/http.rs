use aijob_core::{OrchestratorError, OrchestratorResult, RemoteServiceConfig};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::transport::JobTransport;

/// 基于 reqwest 的外部服务传输实现
pub struct HttpJobTransport {
    base_url: Option<String>,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpJobTransport {
    pub fn new(config: &RemoteServiceConfig) -> OrchestratorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::configuration(format!("HTTP客户端初始化失败: {e}")))?;

        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            base_url: non_blank(&config.base_url).map(|u| u.trim_end_matches('/').to_string()),
            api_key: non_blank(&config.api_key),
            http_client,
        })
    }

    /// 地址或凭证缺失时立即返回配置错误
    fn endpoint(&self, path: &str) -> OrchestratorResult<(String, &str)> {
        match (&self.base_url, &self.api_key) {
            (Some(base_url), Some(api_key)) => Ok((format!("{base_url}{path}"), api_key.as_str())),
            _ => Err(OrchestratorError::configuration(
                "外部AI服务地址或API密钥未配置",
            )),
        }
    }

    async fn read_response(url: &str, response: reqwest::Response) -> OrchestratorResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("外部服务返回错误: {} HTTP {} - {}", url, status, body);
            return Err(OrchestratorError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| OrchestratorError::Network(format!("读取响应失败: {e}")))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            OrchestratorError::Serialization(format!("外部服务响应不是合法JSON: {e}"))
        })
    }
}

#[async_trait]
impl JobTransport for HttpJobTransport {
    async fn post_json(&self, path: &str, body: &Value) -> OrchestratorResult<Value> {
        let (url, api_key) = self.endpoint(path)?;
        debug!("POST {}", url);

        match self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
        {
            Ok(response) => Self::read_response(&url, response).await,
            Err(e) => {
                error!("连接外部服务失败: {} - {}", url, e);
                Err(OrchestratorError::Network(format!("连接外部服务失败: {e}")))
            }
        }
    }

    async fn get_json(&self, path: &str) -> OrchestratorResult<Value> {
        let (url, api_key) = self.endpoint(path)?;
        debug!("GET {}", url);

        match self.http_client.get(&url).bearer_auth(api_key).send().await {
            Ok(response) => Self::read_response(&url, response).await,
            Err(e) => {
                warn!("查询外部任务状态失败: {} - {}", url, e);
                Err(OrchestratorError::Network(format!("查询外部任务状态失败: {e}")))
            }
        }
    }
}
