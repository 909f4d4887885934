use aijob_domain::OrchestratorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("编排错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Orchestrator(err) => match err {
                OrchestratorError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
                OrchestratorError::TaxonomyNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "TAXONOMY_NOT_FOUND")
                }
                OrchestratorError::Data(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_DATA"),
                OrchestratorError::Configuration(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "REMOTE_NOT_CONFIGURED")
                }
                OrchestratorError::Remote { .. }
                | OrchestratorError::RemoteJobFailed(_)
                | OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR"),
                OrchestratorError::Database(_)
                | OrchestratorError::Serialization(_)
                | OrchestratorError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        // 内部错误不向调用方暴露细节
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("请求处理失败: {}", self);
            "系统内部错误".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
