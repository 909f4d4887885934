use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OrchestratorError, OrchestratorResult};

/// 外部AI任务服务配置
///
/// `base_url` 与 `api_key` 允许缺省：缺省时服务仍可启动，
/// 但任何提交都会以配置错误立即失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteServiceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub bulk_labeling_path: String,
    pub learning_path: String,
    pub taxonomy_sync_path: String,
    pub training_path: String,
    /// 状态查询路径模板，`{job_id}` 会被替换为外部任务句柄
    pub status_path: String,
    pub request_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_seconds: u64,
}

impl Default for RemoteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            bulk_labeling_path: "/v1/jobs/labeling".to_string(),
            learning_path: "/v1/jobs/learning".to_string(),
            taxonomy_sync_path: "/v1/jobs/taxonomy-sync".to_string(),
            training_path: "/v1/jobs/training".to_string(),
            status_path: "/v1/jobs/{job_id}".to_string(),
            request_timeout_seconds: 30,
            poll_interval_ms: 5_000,
            poll_timeout_seconds: 3_600,
        }
    }
}

impl RemoteServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// 地址和凭证均已配置
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.base_url) && present(&self.api_key)
    }
}

impl ConfigValidator for RemoteServiceConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(OrchestratorError::configuration(format!(
                    "remote.base_url 必须是 http(s) 地址: {url}"
                )));
            }
        }

        ValidationUtils::validate_path(&self.bulk_labeling_path, "remote.bulk_labeling_path")?;
        ValidationUtils::validate_path(&self.learning_path, "remote.learning_path")?;
        ValidationUtils::validate_path(&self.taxonomy_sync_path, "remote.taxonomy_sync_path")?;
        ValidationUtils::validate_path(&self.training_path, "remote.training_path")?;
        ValidationUtils::validate_path(&self.status_path, "remote.status_path")?;

        if !self.status_path.contains("{job_id}") {
            return Err(OrchestratorError::configuration(
                "remote.status_path 必须包含 {job_id} 占位符",
            ));
        }

        ValidationUtils::validate_positive(
            self.request_timeout_seconds,
            "remote.request_timeout_seconds",
        )?;
        ValidationUtils::validate_positive(self.poll_interval_ms, "remote.poll_interval_ms")?;
        ValidationUtils::validate_positive(self.poll_timeout_seconds, "remote.poll_timeout_seconds")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_remote_is_still_valid() {
        let config = RemoteServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_configured());
    }

    #[test]
    fn blank_api_key_is_not_configured() {
        let config = RemoteServiceConfig {
            base_url: Some("https://ai.example.com".to_string()),
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!config.is_configured());
    }

    #[test]
    fn status_path_requires_placeholder() {
        let config = RemoteServiceConfig {
            status_path: "/v1/jobs/status".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let config = RemoteServiceConfig {
            base_url: Some("ftp://ai.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
