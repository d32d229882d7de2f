use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{ExecutorReport, Job, JobSpec, JobStatus, TaskHandle},
    executor::TaskExecutor,
    state_machine::{reduce_job, JobStateMachine, Reconciliation, RetryPolicy},
};

use crate::job_store::JobStore;
use crate::MAX_CAS_ATTEMPTS;

/// 任务记录与外部执行器之间的桥梁
///
/// 派发时向执行器申请句柄并写入任务，执行器回报经纯函数 [`reduce_job`]
/// 折叠为状态转换后以比较并交换落库。
pub struct TaskCorrelator {
    store: Arc<JobStore>,
    executor: Arc<dyn TaskExecutor>,
    policy: RetryPolicy,
}

impl TaskCorrelator {
    pub fn new(store: Arc<JobStore>, executor: Arc<dyn TaskExecutor>, policy: RetryPolicy) -> Self {
        Self {
            store,
            executor,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// pending -> running；提交失败时任务转为 failed 并记录原因
    #[instrument(skip(self, job), fields(job_id = job.id, backend = self.executor.backend()))]
    pub async fn dispatch(&self, job: &Job) -> SceneResult<Job> {
        if job.status != JobStatus::Pending {
            return Err(SceneError::illegal_transition(
                job.id,
                job.status,
                JobStatus::Running,
            ));
        }
        JobStateMachine::validate(job.id, job.status, JobStatus::Running)?;

        match self.executor.submit(&JobSpec::from(job)).await {
            Ok(handle) => self.bind_handle(job, handle).await,
            Err(e) => {
                error!("任务 {} 提交到执行器失败: {}", job.id, e);
                let failed = JobStateMachine::transition(
                    job,
                    JobStatus::Failed,
                    Some(format!("dispatch failed: {e}")),
                    Utc::now(),
                )?;
                if self.store.apply(job, &failed).await? {
                    Ok(failed)
                } else {
                    let latest = self.store.get(job.id).await?;
                    Err(SceneError::illegal_transition(
                        job.id,
                        latest.status,
                        JobStatus::Failed,
                    ))
                }
            }
        }
    }

    pub async fn dispatch_by_id(&self, job_id: i64) -> SceneResult<Job> {
        let job = self.store.get(job_id).await?;
        self.dispatch(&job).await
    }

    /// retrying -> running，使用新的任务句柄
    ///
    /// 执行器不可用时这次尝试计入重试预算：预算未耗尽则保持 retrying 并返回错误，
    /// 退避按新的 retry_count 重新计时；预算耗尽则任务转为 failed 并返回该记录。
    #[instrument(skip(self, job), fields(job_id = job.id, retry_count = job.retry_count))]
    pub async fn redispatch(&self, job: &Job) -> SceneResult<Job> {
        if job.status != JobStatus::Retrying {
            return Err(SceneError::illegal_transition(
                job.id,
                job.status,
                JobStatus::Running,
            ));
        }

        match self.executor.submit(&JobSpec::from(job)).await {
            Ok(handle) => self.bind_handle(job, handle).await,
            Err(e) => {
                let charged = JobStateMachine::charge_failed_attempt(
                    job,
                    format!("redispatch failed: {e}"),
                    &self.policy,
                    Utc::now(),
                )?;
                if !self.store.apply(job, &charged).await? {
                    debug!("任务 {} 已被并发修改，跳过记录本次失败", job.id);
                    return Err(e);
                }
                if charged.status == JobStatus::Failed {
                    warn!("任务 {} 重试预算已耗尽，标记为失败: {}", job.id, e);
                    return Ok(charged);
                }
                warn!(
                    retry_count = charged.retry_count,
                    "任务 {} 重新派发失败，等待下一轮重试: {}", job.id, e
                );
                Err(e)
            }
        }
    }

    /// 把新句柄写入任务；写入失败说明任务已被并发修改，撤销执行器上的任务
    async fn bind_handle(&self, job: &Job, handle: TaskHandle) -> SceneResult<Job> {
        let running = JobStateMachine::start(job, handle.clone(), Utc::now())?;
        if self.store.apply(job, &running).await? {
            info!(job_id = job.id, task_id = %handle, attempt = running.retry_count + 1, "任务已派发");
            return Ok(running);
        }

        warn!("任务 {} 派发期间状态已变化，撤销执行器任务 {}", job.id, handle);
        if let Err(e) = self.executor.cancel(&handle).await {
            warn!("撤销执行器任务 {} 失败: {}", handle, e);
        }
        let latest = self.store.get(job.id).await?;
        Err(SceneError::illegal_transition(
            job.id,
            latest.status,
            JobStatus::Running,
        ))
    }

    /// 把执行器回报应用到任务
    ///
    /// 重复投递的回报不会再次生效；与当前句柄不符的回报被忽略。
    #[instrument(skip(self, job, report), fields(job_id = job.id, task_id = %report.task_id, kind = ?report.kind))]
    pub async fn reconcile(&self, job: &Job, report: &ExecutorReport) -> SceneResult<Job> {
        let mut current = job.clone();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let next = match reduce_job(&current, report, &self.policy) {
                Reconciliation::Apply { to, error_detail } => {
                    JobStateMachine::transition(&current, to, error_detail, Utc::now())?
                }
                Reconciliation::Touch => {
                    let mut touched = current.clone();
                    touched.touch(Utc::now());
                    touched
                }
                Reconciliation::Ignore(reason) => {
                    debug!("忽略任务 {} 的回报: {}", current.id, reason);
                    return Ok(current);
                }
                Reconciliation::Reject { to } => {
                    warn!(
                        "任务 {} 处于 {} 状态，拒绝转为 {}",
                        current.id, current.status, to
                    );
                    return Err(SceneError::illegal_transition(current.id, current.status, to));
                }
            };

            if self.store.apply(&current, &next).await? {
                if next.status != current.status {
                    info!(
                        from = %current.status,
                        to = %next.status,
                        retry_count = next.retry_count,
                        "任务 {} 状态已更新",
                        next.id
                    );
                }
                return Ok(next);
            }
            current = self.store.get(job.id).await?;
        }

        warn!("任务 {} 回报处理连续冲突 {} 次", job.id, MAX_CAS_ATTEMPTS);
        Err(SceneError::DatabaseOperation(format!(
            "任务 {} 并发更新冲突",
            job.id
        )))
    }

    /// 取消任务，随后尽力通知执行器放弃该任务
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: i64) -> SceneResult<Job> {
        let mut current = self.store.get(job_id).await?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.status == JobStatus::Cancelled {
                debug!("任务 {} 已处于取消状态", job_id);
                return Ok(current);
            }

            let cancelled =
                JobStateMachine::transition(&current, JobStatus::Cancelled, None, Utc::now())?;
            if self.store.apply(&current, &cancelled).await? {
                info!("任务 {} 已取消", job_id);
                if let Some(handle) = &cancelled.task_id {
                    if let Err(e) = self.executor.cancel(handle).await {
                        warn!("通知执行器取消任务 {} 失败: {}", handle, e);
                    }
                }
                return Ok(cancelled);
            }
            current = self.store.get(job_id).await?;
        }

        Err(SceneError::DatabaseOperation(format!(
            "任务 {job_id} 并发更新冲突"
        )))
    }
}
