pub mod config;
pub mod errors;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, ConfigValidator, DatabaseConfig, ObservabilityConfig,
    RemoteServiceConfig, RunnerConfig,
};
pub use errors::*;
pub use logging::init_logging;
