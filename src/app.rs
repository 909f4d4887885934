use std::sync::Arc;
use std::time::Duration;

use aijob_api::create_app;
use aijob_client::{ExternalJobClient, HttpJobTransport};
use aijob_core::AppConfig;
use aijob_dispatcher::Orchestrator;
use aijob_infrastructure::DatabaseManager;
use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 关闭时等待后台监控结束的上限
const MONITOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    orchestrator: Arc<Orchestrator>,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// 连接数据库并完成迁移，然后组装编排器
    pub async fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
        database.migrate().await.context("数据库迁移失败")?;

        Self::with_database(config, database, metrics)
    }

    /// 使用已就绪的数据库组装
    pub fn with_database(
        config: AppConfig,
        database: DatabaseManager,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        if !config.remote.is_configured() {
            warn!("外部AI服务地址或凭证未配置，所有提交都将失败");
        }

        let transport = HttpJobTransport::new(&config.remote).context("创建HTTP客户端失败")?;
        let client = ExternalJobClient::new(Arc::new(transport), &config.remote);

        let orchestrator = Arc::new(Orchestrator::new(
            database.job_repository(),
            database.taxonomy_repository(),
            database.record_repository(),
            client,
            config.runner.clone(),
            config.remote.clone(),
        ));

        Ok(Self {
            config,
            database,
            orchestrator,
            metrics,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    pub fn router(&self) -> Router {
        create_app(self.orchestrator.clone(), self.metrics.clone())
    }

    /// 运行直至收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            self.serve(Some(listener), shutdown_rx).await
        } else {
            info!("API服务已禁用");
            self.serve(None, shutdown_rx).await
        }
    }

    /// 接管进行中的任务，在给定监听器上提供API，收到关闭信号后依次停止
    pub async fn serve(
        &self,
        listener: Option<TcpListener>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        self.orchestrator
            .start()
            .await
            .context("启动编排器失败")?;

        match listener {
            Some(listener) => {
                info!("API服务器启动在 http://{}", listener.local_addr()?);
                axum::serve(listener, self.router())
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.recv().await;
                        info!("API服务器收到关闭信号");
                    })
                    .await
                    .context("API服务器运行失败")?;
            }
            None => {
                let _ = shutdown_rx.recv().await;
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        let aborted = self.orchestrator.shutdown(MONITOR_DRAIN_TIMEOUT).await;
        if aborted > 0 {
            warn!("{} 个外部任务监控在关闭时被中止，将于下次启动时接管", aborted);
        }
        self.database.close().await;
        info!("应用已停止");
    }
}
