use axum::{extract::State, response::IntoResponse, Json};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use scene_domain::entities::ExecutorReport;

use crate::{
    error::{ApiError, ApiResult},
    response::accepted,
    routes::AppState,
};

/// 执行器回报入口，写入回报通道后立即返回 202
pub async fn submit_report(
    State(state): State<AppState>,
    Json(report): Json<ExecutorReport>,
) -> ApiResult<impl IntoResponse> {
    if report.task_id.as_str().trim().is_empty() {
        return Err(ApiError::BadRequest("task_id 不能为空".to_string()));
    }

    debug!(task_id = %report.task_id, kind = ?report.kind, "收到执行器回报");
    match state.reports.try_send(report) {
        Ok(()) => Ok(accepted()),
        Err(TrySendError::Full(report)) => {
            warn!("回报通道已满，拒绝任务 {} 的回报", report.task_id);
            Err(ApiError::Unavailable("回报队列已满，请稍后重试".to_string()))
        }
        Err(TrySendError::Closed(_)) => {
            Err(ApiError::Unavailable("回报处理已停止".to_string()))
        }
    }
}
