//! 测试环境辅助工具

use std::sync::Arc;
use std::time::Duration;

use aijob_client::{ExternalJobClient, JobTransport};
use aijob_core::{RemoteServiceConfig, RunnerConfig};
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// 在超时前轮询等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// 指向测试替身的远端配置，地址与凭证均已设置
    pub fn remote_config() -> RemoteServiceConfig {
        RemoteServiceConfig {
            base_url: Some("http://fake-remote.local".to_string()),
            api_key: Some("test-key".to_string()),
            ..RemoteServiceConfig::default()
        }
    }

    /// 毫秒级轮询的客户端
    pub fn fast_client(transport: Arc<dyn JobTransport>) -> ExternalJobClient {
        ExternalJobClient::new(transport, &Self::remote_config())
            .with_timing(Duration::from_millis(2), Duration::from_secs(2))
    }

    /// 批次重试无等待的运行器配置
    pub fn fast_runner_config(batch_size: usize) -> RunnerConfig {
        RunnerConfig {
            batch_size,
            batch_retry_delay_ms: 1,
            ..RunnerConfig::default()
        }
    }
}
