use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{Job, JobFilter, JobStatus},
    metadata::MetadataExtractor,
    repositories::JobRepository,
    state_machine::JobStateMachine,
};
use scene_infrastructure::observability::MetricsRegistry;

use crate::MAX_CAS_ATTEMPTS;

/// 提交结果：新建或复用已有的活跃任务
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Created(Job),
    Existing(Job),
}

impl Submission {
    pub fn job(&self) -> &Job {
        match self {
            Submission::Created(job) | Submission::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Submission::Created(job) | Submission::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created(_))
    }
}

/// 任务记录的持久化边界
///
/// 所有状态写入都经过 [`JobStateMachine`] 校验，再以比较并交换的方式落库。
pub struct JobStore {
    repo: Arc<dyn JobRepository>,
    extractor: MetadataExtractor,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl JobStore {
    pub fn new(repo: Arc<dyn JobRepository>, extractor: MetadataExtractor) -> Self {
        Self {
            repo,
            extractor,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    /// 从源文件名解析身份并创建 pending 任务
    #[instrument(skip(self))]
    pub async fn create(&self, name: Option<String>, source_ref: &str) -> SceneResult<Job> {
        if source_ref.trim().is_empty() {
            return Err(SceneError::InvalidJobParams("source_ref 不能为空".to_string()));
        }

        let metadata = self.extractor.extract(source_ref);
        if metadata.satellite.is_none() || metadata.captured_at.is_none() {
            debug!("源文件 {} 的身份信息不完整，任务不参与去重", source_ref);
        }

        let job = self.repo.create(&Job::new(name, source_ref, metadata)).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_job_created();
        }
        info!(
            job_id = job.id,
            satellite = ?job.satellite,
            captured_at = ?job.captured_at,
            "任务已创建"
        );
        Ok(job)
    }

    /// 创建任务；`dedup` 为真时把身份冲突视为幂等成功并返回已有的活跃任务
    pub async fn submit(
        &self,
        name: Option<String>,
        source_ref: &str,
        dedup: bool,
    ) -> SceneResult<Submission> {
        match self.create(name, source_ref).await {
            Ok(job) => Ok(Submission::Created(job)),
            Err(SceneError::DuplicateActiveJob {
                satellite,
                captured_at,
            }) if dedup => {
                let metadata = self.extractor.extract(source_ref);
                let existing = match metadata.captured_at {
                    Some(at) => self.repo.find_active_by_identity(&satellite, at).await?,
                    None => None,
                };
                match existing {
                    Some(job) => {
                        debug!("复用已有的活跃任务 {}", job.id);
                        Ok(Submission::Existing(job))
                    }
                    // 冲突的任务刚好进入终态，不再重试创建
                    None => Err(SceneError::DuplicateActiveJob {
                        satellite,
                        captured_at,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: i64) -> SceneResult<Job> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(SceneError::JobNotFound { id })
    }

    pub async fn list(&self, filter: &JobFilter) -> SceneResult<Vec<Job>> {
        self.repo.list(filter).await
    }

    /// 经状态机校验后更新状态
    ///
    /// 并发冲突时重读记录：目标状态已被他人写入则直接返回，否则按最新状态重新校验。
    /// 进入 running 必须携带任务句柄，只能通过派发完成；
    /// 进入 retrying 要消耗重试预算，只能由执行器回报或重新派发触发。
    #[instrument(skip(self, error_detail))]
    pub async fn update_status(
        &self,
        id: i64,
        new_status: JobStatus,
        error_detail: Option<String>,
    ) -> SceneResult<Job> {
        match new_status {
            JobStatus::Running => {
                return Err(SceneError::InvalidJobParams(
                    "running 状态只能通过派发进入".to_string(),
                ));
            }
            JobStatus::Retrying => {
                return Err(SceneError::InvalidJobParams(
                    "retrying 状态由重试策略控制，不能手动设置".to_string(),
                ));
            }
            _ => {}
        }

        let mut current = self.get(id).await?;
        for attempt in 0..MAX_CAS_ATTEMPTS {
            if attempt > 0 && current.status == new_status {
                debug!("任务 {} 已由并发操作转为 {}", id, new_status);
                return Ok(current);
            }

            let next =
                JobStateMachine::transition(&current, new_status, error_detail.clone(), Utc::now())?;
            if self.apply(&current, &next).await? {
                return Ok(next);
            }
            current = self.get(id).await?;
        }

        warn!("任务 {} 状态更新连续冲突 {} 次", id, MAX_CAS_ATTEMPTS);
        Err(SceneError::DatabaseOperation(format!(
            "任务 {id} 并发更新冲突"
        )))
    }

    /// 以 `current` 为期望值写入 `next`，成功时记录指标
    pub async fn apply(&self, current: &Job, next: &Job) -> SceneResult<bool> {
        let swapped = self.repo.compare_and_swap(current, next).await?;
        if swapped && current.status != next.status {
            if let Some(metrics) = &self.metrics {
                metrics.record_transition(next);
            }
        }
        Ok(swapped)
    }

    /// running/retrying 且超过 `timeout` 未更新的任务
    pub async fn find_orphaned(&self, timeout: Duration) -> SceneResult<Vec<Job>> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| SceneError::InvalidJobParams(format!("超时时间非法: {e}")))?;
        self.repo
            .find_stale(&[JobStatus::Running, JobStatus::Retrying], Utc::now() - timeout)
            .await
    }

    /// 刷新各状态任务数的指标
    pub async fn refresh_status_gauges(&self) -> SceneResult<Vec<(JobStatus, i64)>> {
        let counts = self.repo.count_by_status().await?;
        if let Some(metrics) = &self.metrics {
            metrics.update_status_counts(&counts);
        }
        Ok(counts)
    }
}
