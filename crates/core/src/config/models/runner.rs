use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::errors::{OrchestratorError, OrchestratorResult};

/// 批量标注执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub batch_size: usize,
    pub max_batch_attempts: u32,
    pub batch_retry_delay_ms: u64,
    /// 执行锁超过该时长视为失效，可被新的触发覆盖
    pub lock_stale_after_secs: u64,
    /// 处理中任务超过该时长视为卡死，由看门狗重置为待处理
    pub stuck_job_after_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batch_attempts: 3,
            batch_retry_delay_ms: 5_000,
            lock_stale_after_secs: 6 * 3_600,
            stuck_job_after_secs: 24 * 3_600,
        }
    }
}

impl RunnerConfig {
    pub fn batch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.batch_retry_delay_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    pub fn stuck_job_after(&self) -> Duration {
        Duration::from_secs(self.stuck_job_after_secs)
    }
}

impl ConfigValidator for RunnerConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_count(self.batch_size, "runner.batch_size", 10_000)?;
        ValidationUtils::validate_count(
            self.max_batch_attempts as usize,
            "runner.max_batch_attempts",
            20,
        )?;
        ValidationUtils::validate_positive(self.lock_stale_after_secs, "runner.lock_stale_after_secs")?;
        ValidationUtils::validate_positive(self.stuck_job_after_secs, "runner.stuck_job_after_secs")?;

        if self.stuck_job_after_secs < self.lock_stale_after_secs {
            return Err(OrchestratorError::configuration(
                "runner.stuck_job_after_secs 不应小于 runner.lock_stale_after_secs",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runner_config_is_valid() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = RunnerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stuck_threshold_below_lock_threshold_is_rejected() {
        let config = RunnerConfig {
            lock_stale_after_secs: 100,
            stuck_job_after_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
