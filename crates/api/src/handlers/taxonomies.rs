use aijob_domain::{Job, JobStatus};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::ApiResult, response::accepted, routes::AppState};

fn queue_message(job: &Job) -> &'static str {
    if job.status == JobStatus::Pending {
        "已有任务在执行，新任务已排队"
    } else {
        "任务已提交到外部服务"
    }
}

pub async fn request_taxonomy_sync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.orchestrator.request_taxonomy_sync(id).await?;
    let message = queue_message(&job);
    Ok(accepted(job, message))
}

pub async fn request_learning(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.orchestrator.request_learning(id).await?;
    let message = queue_message(&job);
    Ok(accepted(job, message))
}
