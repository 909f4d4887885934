use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://aijob.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;

        if !self.url.starts_with("sqlite:") {
            return Err(OrchestratorError::configuration(
                "database.url 必须以 sqlite: 开头",
            ));
        }

        ValidationUtils::validate_count(self.max_connections as usize, "database.max_connections", 100)?;

        if self.min_connections > self.max_connections {
            return Err(OrchestratorError::configuration(
                "database.min_connections 不能大于 max_connections",
            ));
        }

        ValidationUtils::validate_positive(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;

        Ok(())
    }
}
