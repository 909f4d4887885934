//! 配置模型与加载

pub mod models;
pub mod validation;

pub use models::{
    ApiConfig, AppConfig, DatabaseConfig, ObservabilityConfig, RemoteServiceConfig, RunnerConfig,
};
pub use validation::{ConfigValidator, ValidationUtils};
