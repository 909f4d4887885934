use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use aijob_core::{DatabaseConfig, OrchestratorResult};
use aijob_domain::{JobRepository, RecordRepository, TaxonomyRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::migrations::run_migrations;
use super::sqlite::{SqliteJobRepository, SqliteRecordRepository, SqliteTaxonomyRepository};

/// SQLite 数据库管理器，负责连接池、迁移与仓储构造
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> OrchestratorResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        info!("数据库连接成功: {}", config.url);
        Ok(Self { pool })
    }

    /// 单连接内存数据库，连接永不回收以免丢失数据
    pub async fn in_memory() -> OrchestratorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> OrchestratorResult<()> {
        run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> OrchestratorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        debug!("关闭数据库连接池");
        self.pool.close().await;
    }

    pub fn job_repository(&self) -> Arc<dyn JobRepository> {
        Arc::new(SqliteJobRepository::new(self.pool.clone()))
    }

    pub fn taxonomy_repository(&self) -> Arc<dyn TaxonomyRepository> {
        Arc::new(SqliteTaxonomyRepository::new(self.pool.clone()))
    }

    pub fn record_repository(&self) -> Arc<dyn RecordRepository> {
        Arc::new(SqliteRecordRepository::new(self.pool.clone()))
    }
}
