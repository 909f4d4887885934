use axum::{extract::State, response::IntoResponse};

use crate::{error::ApiResult, response::success, routes::AppState};

/// 队列快照：是否有活跃/运行中任务、下一个待处理任务与执行循环状态
pub async fn get_queue_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let status = state.orchestrator.status().await?;
    Ok(success(status))
}
