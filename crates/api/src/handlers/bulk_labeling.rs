use aijob_dispatcher::TriggerOutcome;
use aijob_domain::Job;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    response::accepted,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateBulkLabelingRequest {
    pub taxonomy_id: i64,
    pub record_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkLabelingAccepted {
    pub job: Job,
    pub trigger: TriggerOutcome,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub outcome: TriggerOutcome,
}

/// 创建批量标注任务并唤醒执行循环
pub async fn create_bulk_labeling_job(
    State(state): State<AppState>,
    Json(request): Json<CreateBulkLabelingRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.record_ids.is_empty() {
        return Err(ApiError::BadRequest("record_ids 不能为空".to_string()));
    }

    let (job, trigger) = state
        .orchestrator
        .submit_bulk_labeling(request.taxonomy_id, request.record_ids)
        .await?;
    Ok(accepted(
        BulkLabelingAccepted { job, trigger },
        "批量标注任务已排队",
    ))
}

pub async fn trigger_bulk_labeling(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.orchestrator.trigger_bulk_labeling();
    let message = match outcome {
        TriggerOutcome::Started => "执行循环已启动",
        TriggerOutcome::AlreadyRunning => "执行循环正在运行",
        TriggerOutcome::StaleLockOverridden => "已覆盖失效的运行锁并重新启动",
    };
    accepted(TriggerResponse { outcome }, message)
}
