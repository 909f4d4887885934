use thiserror::Error;

/// 编排核心错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 外部服务地址或凭证缺失，不重试
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 外部服务返回非成功状态码
    #[error("外部服务返回错误: HTTP {status} - {body}")]
    Remote { status: u16, body: String },

    /// 外部任务进入失败终态
    #[error("外部任务执行失败: {0}")]
    RemoteJobFailed(String),

    #[error("轮询超时: {0}")]
    Timeout(String),

    #[error("网络错误: {0}")]
    Network(String),

    /// 任务引用的数据无效（分类体系缺失/停用、工作集为空等），重试无法改变结果
    #[error("数据错误: {0}")]
    Data(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("分类体系未找到: {id}")]
    TaxonomyNotFound { id: i64 },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 批次级别可重试的错误：远端错误、网络抖动与单次轮询超时
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Remote { .. }
                | OrchestratorError::RemoteJobFailed(_)
                | OrchestratorError::Network(_)
                | OrchestratorError::Timeout(_)
        )
    }

    /// 错误分类标签，用于日志与指标
    pub fn category(&self) -> &'static str {
        match self {
            OrchestratorError::Database(_) => "database",
            OrchestratorError::Configuration(_) => "configuration",
            OrchestratorError::Remote { .. } => "remote",
            OrchestratorError::RemoteJobFailed(_) => "remote_job",
            OrchestratorError::Timeout(_) => "timeout",
            OrchestratorError::Network(_) => "network",
            OrchestratorError::Data(_) => "data",
            OrchestratorError::JobNotFound { .. } => "job_not_found",
            OrchestratorError::TaxonomyNotFound { .. } => "taxonomy_not_found",
            OrchestratorError::Serialization(_) => "serialization",
            OrchestratorError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
