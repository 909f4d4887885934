use aijob_dispatcher::CancelOutcome;
use aijob_domain::{JobStatus, OrchestratorError};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: i64,
    /// 本次请求是否改变了任务状态
    pub cancelled: bool,
    pub status: JobStatus,
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .orchestrator
        .get_job(id)
        .await?
        .ok_or(OrchestratorError::JobNotFound { id })?;
    Ok(success(job))
}

/// 取消任务；已处于终态的任务原样返回
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let response = match state.orchestrator.cancel(id).await? {
        CancelOutcome::Cancelled => {
            info!("通过API取消任务 {}", id);
            CancelResponse {
                job_id: id,
                cancelled: true,
                status: JobStatus::Cancelled,
            }
        }
        CancelOutcome::AlreadyFinished(status) => CancelResponse {
            job_id: id,
            cancelled: false,
            status,
        },
    };
    Ok(success(response))
}
