//! # AI Job API
//!
//! 编排核心的 HTTP 控制面，基于 Axum 构建。
//!
//! ## API 端点
//!
//! ### 系统
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus 指标
//! - `GET /api/queue` - 队列与执行循环状态
//!
//! ### 任务
//! - `GET /api/jobs/{id}` - 任务详情与进度
//! - `POST /api/jobs/{id}/cancel` - 取消任务
//!
//! ### 批量标注
//! - `POST /api/bulk-labeling/jobs` - 创建批量标注任务
//! - `POST /api/bulk-labeling/trigger` - 唤醒执行循环
//!
//! ### 分类体系与训练
//! - `POST /api/taxonomies/{id}/sync` - 同步分类体系到外部服务
//! - `POST /api/taxonomies/{id}/learn` - 从新的人工标注中学习
//! - `POST /api/training-jobs` - 发起外部训练
//!
//! 成功响应统一使用 [`response::ApiResponse`] 信封；错误经由 [`error::ApiError`]
//! 映射为状态码。后台任务类接口返回 `202 Accepted`。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use aijob_dispatcher::Orchestrator;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建带追踪、CORS 与请求日志中间件的应用
pub fn create_app(orchestrator: Arc<Orchestrator>, metrics: Option<PrometheusHandle>) -> Router {
    let state = AppState {
        orchestrator,
        metrics,
    };

    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
