use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::SceneResult;
use scene_domain::{
    entities::{Job, JobFilter, JobStatus, TaskHandle},
    repositories::JobRepository,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use crate::database::schema::JOB_COLUMNS;
use crate::error_handling::{JobOperationContext, RepositoryErrorHelpers, RepositoryOperation};

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> SceneResult<Job> {
        let id: i64 = row.try_get("id")?;
        let task_id: Option<String> = row.try_get("task_id")?;
        let retry_count: i32 = row.try_get("retry_count")?;
        Ok(Job {
            id,
            name: row.try_get("name")?,
            source_ref: row.try_get("source_ref")?,
            task_id: task_id.map(TaskHandle::from),
            status: row.try_get("status")?,
            satellite: row.try_get("satellite")?,
            captured_at: row.try_get("captured_at")?,
            retry_count: u32::try_from(retry_count).map_err(|_| {
                RepositoryErrorHelpers::invalid_retry_count(id, i64::from(retry_count))
            })?,
            error_detail: row.try_get("error_detail")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn select() -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1"))
    }

    fn retry_count_param(job: &Job) -> i32 {
        i32::try_from(job.retry_count).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[instrument(skip(self, job), fields(satellite = ?job.satellite, captured_at = ?job.captured_at))]
    async fn create(&self, job: &Job) -> SceneResult<Job> {
        let context = JobOperationContext::for_job(RepositoryOperation::Create, job);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (name, source_ref, task_id, status, satellite, captured_at,
                              retry_count, error_detail, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&job.name)
        .bind(&job.source_ref)
        .bind(job.task_id.as_ref().map(TaskHandle::as_str))
        .bind(job.status)
        .bind(&job.satellite)
        .bind(job.captured_at)
        .bind(Self::retry_count_param(job))
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
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn get_by_task_id(&self, task_id: &TaskHandle) -> SceneResult<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE task_id = $1 ORDER BY id DESC LIMIT 1"
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
             WHERE satellite = $1 AND captured_at = $2
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
            query.push(" AND captured_at >= ").push_bind(from);
        }
        if let Some(to) = filter.captured_to {
            query.push(" AND captured_at < ").push_bind(to);
        }
        query.push(" ORDER BY captured_at ASC NULLS LAST, created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            query.push(" OFFSET ").push_bind(offset);
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
            SET name = $1, task_id = $2, status = $3, retry_count = $4, error_detail = $5,
                updated_at = GREATEST(updated_at, $6)
            WHERE id = $7 AND status = $8 AND retry_count = $9
              AND task_id IS NOT DISTINCT FROM $10
            "#,
        )
        .bind(&next.name)
        .bind(next.task_id.as_ref().map(TaskHandle::as_str))
        .bind(next.status)
        .bind(Self::retry_count_param(next))
        .bind(&next.error_detail)
        .bind(next.updated_at)
        .bind(current.id)
        .bind(current.status)
        .bind(Self::retry_count_param(current))
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
            .push(" AND updated_at < ")
            .push_bind(updated_before)
            .push(" ORDER BY updated_at, id");

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
