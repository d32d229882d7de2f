use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use scene_core::SceneError;
use scene_dispatcher::Submission;
use scene_domain::entities::{Job, JobFilter, JobStatus};

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 单页最多返回的任务数
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub source_ref: String,
    pub name: Option<String>,
    /// 身份冲突时返回已有的活跃任务而不是 409
    #[serde(default)]
    pub dedup: bool,
    /// 创建后立即派发
    #[serde(default)]
    pub dispatch: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobQueryParams {
    pub status: Option<String>,
    pub satellite: Option<String>,
    pub captured_from: Option<DateTime<Utc>>,
    pub captured_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobQueryParams {
    fn into_filter(self) -> ApiResult<JobFilter> {
        let status = match self.status.as_deref() {
            Some(raw) => Some(
                JobStatus::parse(&raw.to_lowercase())
                    .ok_or_else(|| ApiError::BadRequest(format!("未知的任务状态: {raw}")))?,
            ),
            None => None,
        };
        if let (Some(from), Some(to)) = (self.captured_from, self.captured_to) {
            if from >= to {
                return Err(ApiError::BadRequest(
                    "captured_from 必须早于 captured_to".to_string(),
                ));
            }
        }
        if self.limit.is_some_and(|l| l <= 0) || self.offset.is_some_and(|o| o < 0) {
            return Err(ApiError::BadRequest("分页参数无效".to_string()));
        }

        Ok(JobFilter {
            status,
            satellite: self.satellite.filter(|s| !s.trim().is_empty()),
            captured_from: self.captured_from,
            captured_to: self.captured_to,
            limit: Some(self.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE)),
            offset: self.offset,
        })
    }
}

/// 状态冲突时附带任务的最新记录
async fn conflict_with_current(state: &AppState, job_id: i64, error: SceneError) -> ApiError {
    match error {
        SceneError::IllegalTransition { .. } => {
            let current = state.store.get(job_id).await.ok();
            ApiError::conflict(error, current)
        }
        other => ApiError::Scene(other),
    }
}

/// 创建任务
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<Response> {
    let submission = match state
        .store
        .submit(request.name.clone(), &request.source_ref, request.dedup)
        .await
    {
        Ok(submission) => submission,
        Err(err @ SceneError::DuplicateActiveJob { .. }) => {
            let metadata = state.store.extractor().extract(&request.source_ref);
            let current = match (metadata.satellite, metadata.captured_at) {
                (Some(satellite), Some(at)) => state
                    .store
                    .repository()
                    .find_active_by_identity(&satellite, at)
                    .await
                    .ok()
                    .flatten(),
                _ => None,
            };
            return Err(ApiError::conflict(err, current));
        }
        Err(e) => return Err(e.into()),
    };

    match submission {
        Submission::Existing(job) => Ok(ApiResponse::success_with_message(
            job,
            "已存在相同身份的活跃任务".to_string(),
        )
        .into_response()),
        Submission::Created(job) => {
            let job = if request.dispatch {
                dispatch_created(&state, job).await?
            } else {
                job
            };
            Ok(created(job).into_response())
        }
    }
}

async fn dispatch_created(state: &AppState, job: Job) -> ApiResult<Job> {
    let job_id = job.id;
    match state.correlator.dispatch(&job).await {
        Ok(dispatched) => {
            info!("任务 {} 创建后已派发，状态 {}", job_id, dispatched.status);
            Ok(dispatched)
        }
        Err(e) => {
            warn!("任务 {} 创建后派发失败: {}", job_id, e);
            Err(conflict_with_current(state, job_id, e).await)
        }
    }
}

/// 获取任务列表
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = params.into_filter()?;
    let jobs = state.store.list(&filter).await?;
    Ok(success(jobs))
}

/// 获取单个任务
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let job = state.store.get(id).await?;
    Ok(success(job))
}

/// 派发任务到执行器
pub async fn dispatch_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match state.correlator.dispatch_by_id(id).await {
        Ok(job) => Ok(success(job)),
        Err(e) => Err(conflict_with_current(&state, id, e).await),
    }
}

/// 取消任务
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match state.correlator.cancel(id).await {
        Ok(job) => Ok(success(job)),
        Err(e) => Err(conflict_with_current(&state, id, e).await),
    }
}
