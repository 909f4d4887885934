//! 日志初始化

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{OrchestratorError, OrchestratorResult};

/// 初始化全局日志系统
///
/// `RUST_LOG` 存在时优先于 `log_level`。重复初始化会返回配置错误。
pub fn init_logging(log_level: &str, log_format: &str) -> OrchestratorResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false),
            )
            .try_init()
            .map_err(|e| OrchestratorError::configuration(format!("初始化JSON日志格式失败: {e}"))),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| {
                OrchestratorError::configuration(format!("初始化Pretty日志格式失败: {e}"))
            }),
        _ => Err(OrchestratorError::configuration(format!(
            "不支持的日志格式: {log_format}"
        ))),
    }
}
