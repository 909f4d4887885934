use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_not_empty(&self.bind_address, "api.bind_address")?;
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(OrchestratorError::configuration(format!(
                "api.bind_address 不是有效的监听地址: {}",
                self.bind_address
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(OrchestratorError::configuration(format!(
                "无效的日志级别: {}. 可选值: {:?}",
                self.log_level, valid_levels
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(OrchestratorError::configuration(format!(
                "无效的日志格式: {}. 可选值: {:?}",
                self.log_format, valid_formats
            )));
        }

        Ok(())
    }
}
