//! 仓储层错误处理
//!
//! 把 sqlx 错误映射为领域错误，并附带操作上下文输出结构化日志。

use scene_core::SceneError;
use scene_domain::entities::{Job, JobStatus};
use sqlx::Error as SqlxError;
use std::fmt;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Query,
    Upsert,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Query => write!(f, "批量查询"),
            RepositoryOperation::Upsert => write!(f, "写入"),
        }
    }
}

/// 任务仓储操作上下文
#[derive(Debug, Clone)]
pub struct JobOperationContext {
    pub operation: RepositoryOperation,
    pub job_id: Option<i64>,
    pub satellite: Option<String>,
    pub captured_at: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            job_id: None,
            satellite: None,
            captured_at: None,
            status: None,
        }
    }

    pub fn for_job(operation: RepositoryOperation, job: &Job) -> Self {
        Self {
            operation,
            job_id: (job.id != 0).then_some(job.id),
            satellite: job.satellite.clone(),
            captured_at: job.captured_at.map(|t| t.to_rfc3339()),
            status: Some(job.status),
        }
    }

    pub fn entity_description(&self) -> String {
        match (self.job_id, &self.satellite) {
            (Some(id), Some(satellite)) => format!("任务 {id} ({satellite})"),
            (Some(id), None) => format!("任务 {id}"),
            (None, Some(satellite)) => format!("任务 ({satellite})"),
            (None, None) => "任务".to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 唯一索引冲突且任务带有完整身份时视为重复活跃任务
    pub fn job_database_error(context: &JobOperationContext, err: SqlxError) -> SceneError {
        if let SqlxError::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                if let (Some(satellite), Some(captured_at)) =
                    (&context.satellite, &context.captured_at)
                {
                    warn!(
                        satellite = %satellite,
                        captured_at = %captured_at,
                        "{}{}失败: 已存在活跃任务",
                        context.operation,
                        context.entity_description()
                    );
                    return SceneError::DuplicateActiveJob {
                        satellite: satellite.clone(),
                        captured_at: captured_at.clone(),
                    };
                }
            }
        }

        error!(
            operation = %context.operation,
            job_id = ?context.job_id,
            status = ?context.status,
            error = %err,
            "{}{}时数据库出错",
            context.operation,
            context.entity_description()
        );
        SceneError::Database(err)
    }

    pub fn setting_database_error(
        operation: RepositoryOperation,
        key: &str,
        err: SqlxError,
    ) -> SceneError {
        error!(operation = %operation, key = key, error = %err, "配置项{}失败", operation);
        SceneError::Database(err)
    }

    pub fn log_operation_success(context: &JobOperationContext, details: Option<&str>) {
        match details {
            Some(details) => debug!(
                "{}{}成功: {}",
                context.operation,
                context.entity_description(),
                details
            ),
            None => debug!("{}{}成功", context.operation, context.entity_description()),
        }
    }

    pub fn invalid_retry_count(job_id: i64, value: i64) -> SceneError {
        SceneError::DatabaseOperation(format!("任务 {job_id} 的重试次数非法: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_domain::metadata::SceneMetadata;

    #[test]
    fn test_entity_description() {
        let mut job = Job::new(None, "a.nc", SceneMetadata::default());
        let context = JobOperationContext::for_job(RepositoryOperation::Create, &job);
        assert_eq!(context.entity_description(), "任务");

        job.id = 3;
        job.satellite = Some("GOES-16".to_string());
        let context = JobOperationContext::for_job(RepositoryOperation::Update, &job);
        assert_eq!(context.entity_description(), "任务 3 (GOES-16)");
    }

    #[test]
    fn test_non_unique_error_stays_database() {
        let context = JobOperationContext::new(RepositoryOperation::Read);
        let err = RepositoryErrorHelpers::job_database_error(&context, SqlxError::RowNotFound);
        assert!(matches!(err, SceneError::Database(_)));
    }
}
