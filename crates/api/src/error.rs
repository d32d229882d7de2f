use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scene_core::SceneError;
use scene_domain::entities::Job;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Scene(#[from] SceneError),

    /// 状态冲突，附带当前任务记录
    #[error("{error}")]
    Conflict {
        error: SceneError,
        current_job: Option<Box<Job>>,
    },

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("服务暂不可用: {0}")]
    Unavailable(String),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    pub fn conflict(error: SceneError, current_job: Option<Job>) -> Self {
        ApiError::Conflict {
            error,
            current_job: current_job.map(Box::new),
        }
    }

    fn classify(error: &SceneError) -> (StatusCode, &'static str) {
        match error {
            SceneError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
            SceneError::DuplicateActiveJob { .. } => (StatusCode::CONFLICT, "DUPLICATE_ACTIVE_JOB"),
            SceneError::IllegalTransition { .. } => (StatusCode::CONFLICT, "ILLEGAL_TRANSITION"),
            SceneError::InvalidJobParams(_) => (StatusCode::BAD_REQUEST, "INVALID_JOB_PARAMS"),
            SceneError::ExecutorUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "EXECUTOR_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, current_job) = match &self {
            ApiError::Scene(err) => {
                let (status, error_type) = Self::classify(err);
                (status, error_type, err.to_string(), None)
            }
            ApiError::Conflict { error, current_job } => {
                let (status, error_type) = Self::classify(error);
                (status, error_type, error.to_string(), current_job.as_deref())
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
                None,
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
                None,
            ),
        };

        if status.is_server_error() {
            tracing::error!(error_type, "请求处理失败: {}", message);
        }

        let mut body = json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        });
        if let Some(job) = current_job {
            body["current_job"] = json!(job);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
