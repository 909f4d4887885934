use crate::errors::{OrchestratorError, OrchestratorResult};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> OrchestratorResult<()>;
}

/// 通用校验工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field_name: &str) -> OrchestratorResult<()> {
        if value.trim().is_empty() {
            return Err(OrchestratorError::configuration(format!(
                "{field_name} 不能为空"
            )));
        }
        Ok(())
    }

    pub fn validate_positive(value: u64, field_name: &str) -> OrchestratorResult<()> {
        if value == 0 {
            return Err(OrchestratorError::configuration(format!(
                "{field_name} 必须大于0"
            )));
        }
        Ok(())
    }

    pub fn validate_count(count: usize, field_name: &str, max: usize) -> OrchestratorResult<()> {
        if count == 0 {
            return Err(OrchestratorError::configuration(format!(
                "{field_name} 必须大于0"
            )));
        }
        if count > max {
            return Err(OrchestratorError::configuration(format!(
                "{field_name} 不能超过 {max}"
            )));
        }
        Ok(())
    }

    /// 路径必须以 `/` 开头，拼接在外部服务地址之后
    pub fn validate_path(path: &str, field_name: &str) -> OrchestratorResult<()> {
        Self::validate_not_empty(path, field_name)?;
        if !path.starts_with('/') {
            return Err(OrchestratorError::configuration(format!(
                "{field_name} 必须以 / 开头: {path}"
            )));
        }
        Ok(())
    }
}
