use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::SceneResult;
use scene_domain::{
    entities::{Job, JobFilter, JobStatus, TaskHandle},
    repositories::JobRepository,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::database::schema::JOB_COLUMNS;
use crate::error_handling::{JobOperationContext, RepositoryErrorHelpers, RepositoryOperation};

/// SQLite 任务仓储
///
/// 时间以 RFC 3339 文本存储，范围比较和排序统一经过 julianday()。
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> SceneResult<Job> {
        let id: i64 = row.try_get("id")?;
        let task_id: Option<String> = row.try_get("task_id")?;
        let retry_count: i64 = row.try_get("retry_count")?;
        Ok(Job {
            id,
            name: row.try_get("name")?,
            source_ref: row.try_get("source_ref")?,
            task_id: task_id.map(TaskHandle::from),
            status: row.try_get("status")?,
            satellite: row.try_get("satellite")?,
            captured_at: row.try_get("captured_at")?,
            retry_count: u32::try_from(retry_count)
                .map_err(|_| RepositoryErrorHelpers::invalid_retry_count(id, retry_count))?,
            error_detail: row.try_get("error_detail")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn select() -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1"))
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(satellite = ?job.satellite, captured_at = ?job.captured_at))]
    async fn create(&self, job: &Job) -> SceneResult<Job> {
        let context = JobOperationContext::for_job(RepositoryOperation::Create, job);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (name, source_ref, task_id, status, satellite, captured_at,
                              retry_count, error_detail, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.name)
        .bind(&job.source_ref)
        .bind(job.task_id.as_ref().map(TaskHandle::as_str))
        .bind(job.status)
        .bind(&job.satellite)
        .bind(job.captured_at)
        .bind(i64::from(job.retry_count))
        .bind(&job.error_detail)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::job_database_error(&context, e))?;

        let created = Self::row_to_job(&row)?;
        RepositoryErrorHelpers::log_operation_success(
            &JobOperationContext::for_job(RepositoryOperation::Create, &created),
            None,
        );
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SceneResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn get_by_task_id(&self, task_id: &TaskHandle) -> SceneResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE task_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn find_active_by_identity(
        &self,
        satellite: &str,
        captured_at: DateTime<Utc>,
    ) -> SceneResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE satellite = ? AND captured_at = ?
               AND status IN ('pending', 'running', 'retrying')
             LIMIT 1"
        ))
        .bind(satellite)
        .bind(captured_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &JobFilter) -> SceneResult<Vec<Job>> {
        let mut query = Self::select();
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(satellite) = &filter.satellite {
            query.push(" AND satellite = ").push_bind(satellite.clone());
        }
        if let Some(from) = filter.captured_from {
            query
                .push(" AND julianday(captured_at) >= julianday(")
                .push_bind(from)
                .push(")");
        }
        if let Some(to) = filter.captured_to {
            query
                .push(" AND julianday(captured_at) < julianday(")
                .push_bind(to)
                .push(")");
        }
        query.push(
            " ORDER BY captured_at IS NULL, julianday(captured_at), julianday(created_at), id",
        );
        if filter.limit.is_some() || filter.offset.is_some() {
            query.push(" LIMIT ").push_bind(filter.limit.unwrap_or(-1));
            query.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0));
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::job_database_error(
                    &JobOperationContext::new(RepositoryOperation::Query),
                    e,
                )
            })?;

        let jobs: SceneResult<Vec<Job>> = rows.iter().map(Self::row_to_job).collect();
        jobs
    }

    #[instrument(skip(self, current, next), fields(
        job_id = current.id,
        from = %current.status,
        to = %next.status,
    ))]
    async fn compare_and_swap(&self, current: &Job, next: &Job) -> SceneResult<bool> {
        let context = JobOperationContext::for_job(RepositoryOperation::Update, next);

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET name = ?, task_id = ?, status = ?, retry_count = ?, error_detail = ?,
                updated_at = CASE WHEN julianday(updated_at) > julianday(?) THEN updated_at ELSE ? END
            WHERE id = ? AND status = ? AND retry_count = ? AND task_id IS ?
            "#,
        )
        .bind(&next.name)
        .bind(next.task_id.as_ref().map(TaskHandle::as_str))
        .bind(next.status)
        .bind(i64::from(next.retry_count))
        .bind(&next.error_detail)
        .bind(next.updated_at)
        .bind(next.updated_at)
        .bind(current.id)
        .bind(current.status)
        .bind(i64::from(current.retry_count))
        .bind(current.task_id.as_ref().map(TaskHandle::as_str))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::job_database_error(&context, e))?;

        let swapped = result.rows_affected() == 1;
        if swapped {
            RepositoryErrorHelpers::log_operation_success(&context, Some(next.status.as_str()));
        } else {
            debug!("任务 {} 状态已被并发修改，放弃写入", current.id);
        }
        Ok(swapped)
    }

    async fn find_stale(
        &self,
        statuses: &[JobStatus],
        updated_before: DateTime<Utc>,
    ) -> SceneResult<Vec<Job>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = Self::select();
        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");
        query
            .push(" AND julianday(updated_at) < julianday(")
            .push_bind(updated_before)
            .push(") ORDER BY julianday(updated_at), id");

        let rows = query.build().fetch_all(&self.pool).await?;
        let jobs: SceneResult<Vec<Job>> = rows.iter().map(Self::row_to_job).collect();
        jobs
    }

    async fn count_by_status(&self) -> SceneResult<Vec<(JobStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> SceneResult<(JobStatus, i64)> {
                Ok((row.try_get("status")?, row.try_get("count")?))
            })
            .collect()
    }
}
