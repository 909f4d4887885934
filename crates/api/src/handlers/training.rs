use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::accepted,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTrainingJobRequest {
    pub taxonomy_id: i64,
    pub training_file: String,
}

/// 以已上传的训练文件发起外部训练
pub async fn create_training_job(
    State(state): State<AppState>,
    Json(request): Json<CreateTrainingJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let training_file = request.training_file.trim();
    if training_file.is_empty() {
        return Err(ApiError::BadRequest("training_file 不能为空".to_string()));
    }

    let job = state
        .orchestrator
        .request_external_training(request.taxonomy_id, training_file.to_string())
        .await?;
    Ok(accepted(job, "训练任务已受理"))
}
