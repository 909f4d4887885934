use aijob_core::OrchestratorResult;
use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ai_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        taxonomy_id INTEGER NOT NULL,
        payload TEXT NOT NULL,
        external_job_id TEXT,
        total_units INTEGER NOT NULL DEFAULT 0,
        processed_units INTEGER NOT NULL DEFAULT 0,
        failed_units INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at DATETIME NOT NULL,
        started_at DATETIME NOT NULL,
        completed_at DATETIME
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taxonomies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        sync_job_id INTEGER,
        sync_status TEXT,
        sync_error TEXT,
        sync_updated_at DATETIME,
        learning_job_id INTEGER,
        learning_status TEXT,
        learning_error TEXT,
        learning_updated_at DATETIME,
        last_learned_at DATETIME
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taxonomy_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        taxonomy_id INTEGER NOT NULL,
        parent_id INTEGER,
        name TEXT NOT NULL,
        synonyms TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dataset_id INTEGER NOT NULL,
        taxonomy_id INTEGER NOT NULL,
        columns TEXT NOT NULL DEFAULT '{}',
        ai_suggestions TEXT,
        suggested_by_job_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS column_mappings (
        dataset_id INTEGER NOT NULL,
        column_name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        position INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (dataset_id, column_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annotations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL,
        taxonomy_id INTEGER NOT NULL,
        node_id INTEGER NOT NULL,
        label TEXT NOT NULL,
        created_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ai_jobs_status ON ai_jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_ai_jobs_kind_status ON ai_jobs(kind, status)",
    "CREATE INDEX IF NOT EXISTS idx_ai_jobs_started_at ON ai_jobs(started_at)",
    "CREATE INDEX IF NOT EXISTS idx_taxonomy_nodes_taxonomy_id ON taxonomy_nodes(taxonomy_id)",
    "CREATE INDEX IF NOT EXISTS idx_annotations_taxonomy_created ON annotations(taxonomy_id, created_at)",
];

/// 运行数据库迁移，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> OrchestratorResult<()> {
    debug!("开始执行SQLite数据库迁移");
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("SQLite数据库迁移完成");
    Ok(())
}
