use std::sync::Arc;

use aijob_dispatcher::Orchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{
    bulk_labeling::{create_bulk_labeling_job, trigger_bulk_labeling},
    health::health_check,
    jobs::{cancel_job, get_job},
    metrics::render_metrics,
    queue::get_queue_status,
    taxonomies::{request_learning, request_taxonomy_sync},
    training::create_training_job,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// 未启用指标导出时为空
    pub metrics: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查与指标
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 队列与任务
        .route("/api/queue", get(get_queue_status))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        // 批量标注
        .route("/api/bulk-labeling/jobs", post(create_bulk_labeling_job))
        .route("/api/bulk-labeling/trigger", post(trigger_bulk_labeling))
        // 分类体系维护
        .route("/api/taxonomies/{id}/sync", post(request_taxonomy_sync))
        .route("/api/taxonomies/{id}/learn", post(request_learning))
        .route("/api/training-jobs", post(create_training_job))
        .with_state(state)
}
