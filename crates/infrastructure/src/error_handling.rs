//! 仓储操作的错误处理与上下文日志

use std::fmt;

use aijob_core::OrchestratorError;
use aijob_domain::JobKind;
use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use tracing::{debug, error};

/// 仓储操作类型
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Query,
    BatchRead,
    Claim,
    Finish,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::BatchRead => write!(f, "批量查询"),
            RepositoryOperation::Claim => write!(f, "认领"),
            RepositoryOperation::Finish => write!(f, "结束"),
        }
    }
}

/// 仓储操作上下文
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: RepositoryOperation,
    pub entity: &'static str,
    pub id: Option<i64>,
    pub kind: Option<JobKind>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl OperationContext {
    pub fn new(operation: RepositoryOperation, entity: &'static str) -> Self {
        Self {
            operation,
            entity,
            id: None,
            kind: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn entity_description(&self) -> String {
        match (self.id, self.kind) {
            (Some(id), Some(kind)) => format!("{} (ID: {}, 种类: {})", self.entity, id, kind),
            (Some(id), None) => format!("{} (ID: {})", self.entity, id),
            (None, Some(kind)) => format!("{} (种类: {})", self.entity, kind),
            (None, None) => self.entity.to_string(),
        }
    }

    /// 记录数据库错误并转换为统一错误类型
    pub fn database_error(&self, error: SqlxError) -> OrchestratorError {
        let entity_desc = self.entity_description();
        match &error {
            SqlxError::PoolClosed => {
                error!(operation = %self.operation, "{}{}时数据库连接池已关闭", self.operation, entity_desc)
            }
            SqlxError::PoolTimedOut => {
                error!(operation = %self.operation, "{}{}时数据库连接池超时", self.operation, entity_desc)
            }
            _ => error!(
                operation = %self.operation,
                error = %error,
                extra = ?self.additional_info,
                "{}{}时发生数据库错误",
                self.operation,
                entity_desc
            ),
        }
        OrchestratorError::Database(error)
    }

    pub fn serialization_error(&self, error: impl fmt::Display) -> OrchestratorError {
        let msg = format!(
            "{}{}时序列化失败: {}",
            self.operation,
            self.entity_description(),
            error
        );
        error!("{}", msg);
        OrchestratorError::Serialization(msg)
    }

    pub fn log_success(&self, details: Option<&str>) {
        match details {
            Some(details) => debug!(
                "{}{}成功: {}",
                self.operation,
                self.entity_description(),
                details
            ),
            None => debug!("{}{}成功", self.operation, self.entity_description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_description_includes_id_and_kind() {
        let ctx = OperationContext::new(RepositoryOperation::Claim, "任务")
            .with_id(9)
            .with_kind(JobKind::Learning);
        assert_eq!(ctx.entity_description(), "任务 (ID: 9, 种类: LEARNING)");
        assert_eq!(ctx.operation.to_string(), "认领");
    }

    #[test]
    fn database_error_keeps_source() {
        let ctx = OperationContext::new(RepositoryOperation::Read, "分类体系");
        let err = ctx.database_error(SqlxError::PoolClosed);
        assert_eq!(err.category(), "database");
    }
}
