use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{ApiConfig, DatabaseConfig, ObservabilityConfig, RemoteServiceConfig, RunnerConfig};
use crate::config::validation::ConfigValidator;
use crate::errors::{OrchestratorError, OrchestratorResult};

/// 默认配置文件搜索路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = ["config/aijob.toml", "aijob.toml", "/etc/aijob/config.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteServiceConfig,
    pub runner: RunnerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：配置文件 → 环境变量 `AIJOB_<SECTION>__<FIELD>` 覆盖
    ///
    /// 未指定路径且默认路径都不存在时，完全使用内置默认值。
    pub fn load(config_path: Option<&str>) -> OrchestratorResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(OrchestratorError::configuration(format!(
                    "配置文件不存在: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("AIJOB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| OrchestratorError::configuration(format!("构建配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| OrchestratorError::configuration(format!("反序列化配置失败: {e}")))?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> OrchestratorResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| OrchestratorError::configuration(format!("解析TOML配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> OrchestratorResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::Serialization(format!("序列化配置为TOML失败: {e}")))
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        self.database.validate()?;
        self.remote.validate()?;
        self.runner.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [runner]
            batch_size = 50

            [remote]
            base_url = "https://ai.example.com"
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.runner.batch_size, 50);
        assert_eq!(config.runner.max_batch_attempts, 3);
        assert!(config.remote.is_configured());
        assert_eq!(config.database.url, "sqlite://aijob.db");
    }

    #[test]
    fn invalid_section_fails_validation() {
        let result = AppConfig::from_toml(
            r#"
            [observability]
            log_format = "xml"
            "#,
        );
        assert!(matches!(result, Err(OrchestratorError::Configuration(_))));
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut config = AppConfig::default();
        config.runner.batch_size = 25;
        config.remote.poll_interval_ms = 250;

        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.runner.batch_size, 25);
        assert_eq!(parsed.remote.poll_interval_ms, 250);
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite::memory:"

            [runner]
            batch_size = 10
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.runner.batch_size, 10);
    }

    #[test]
    fn load_rejects_missing_file() {
        let result = AppConfig::load(Some("/nonexistent/aijob.toml"));
        assert!(matches!(result, Err(OrchestratorError::Configuration(_))));
    }
}
