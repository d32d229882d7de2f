use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use scene_core::{SceneError, SceneResult};
use scene_domain::entities::{Job, JobFilter, JobStatus};

use crate::task_correlator::TaskCorrelator;

/// 到期重试
///
/// 退避时间由 retry_count 推导，不单独存储调度状态。
pub struct RetryService {
    correlator: Arc<TaskCorrelator>,
    interval: Duration,
}

impl RetryService {
    pub fn new(correlator: Arc<TaskCorrelator>, interval: Duration) -> Self {
        Self {
            correlator,
            interval,
        }
    }

    /// 重新派发所有退避已到期的 retrying 任务，返回成功派发的任务
    pub async fn scan(&self) -> SceneResult<Vec<Job>> {
        let now = Utc::now();
        let policy = *self.correlator.policy();
        let due: Vec<Job> = self
            .correlator
            .store()
            .list(&JobFilter::default().with_status(JobStatus::Retrying))
            .await?
            .into_iter()
            .filter(|job| policy.is_due(job, now))
            .collect();

        if due.is_empty() {
            return Ok(Vec::new());
        }
        debug!("{} 个任务到达重试时间", due.len());

        let mut dispatched = Vec::with_capacity(due.len());
        for job in due {
            match self.correlator.redispatch(&job).await {
                Ok(running) if running.status == JobStatus::Running => dispatched.push(running),
                Ok(failed) => {
                    warn!("任务 {} 重试预算耗尽，已转为 {}", failed.id, failed.status);
                }
                Err(SceneError::IllegalTransition { .. }) => {
                    debug!("任务 {} 已被并发修改，跳过重试", job.id);
                }
                Err(e @ SceneError::ExecutorUnavailable(_)) => {
                    warn!("任务 {} 重试时执行器不可用: {}", job.id, e);
                }
                Err(e) => error!("任务 {} 重试失败: {}", job.id, e),
            }
        }

        if !dispatched.is_empty() {
            info!("已重新派发 {} 个任务", dispatched.len());
        }
        Ok(dispatched)
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan().await {
                        error!("重试扫描失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("重试服务收到关闭信号");
                    break;
                }
            }
        }
    }
}
