use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use scene_core::{SceneError, SceneResult};
use scene_domain::entities::{ExecutorReport, Job};

use crate::task_correlator::TaskCorrelator;

/// 消费执行器回报通道
///
/// 回报至少投递一次、同一任务内有序，按句柄找到任务后交给关联器处理。
pub struct ReportListener {
    correlator: Arc<TaskCorrelator>,
}

impl ReportListener {
    pub fn new(correlator: Arc<TaskCorrelator>) -> Self {
        Self { correlator }
    }

    /// 处理单条回报；未知句柄返回 `Ok(None)`
    pub async fn handle_report(&self, report: &ExecutorReport) -> SceneResult<Option<Job>> {
        let job = self
            .correlator
            .store()
            .repository()
            .get_by_task_id(&report.task_id)
            .await?;

        match job {
            Some(job) => self.correlator.reconcile(&job, report).await.map(Some),
            None => {
                warn!("收到未知任务句柄 {} 的回报，已丢弃", report.task_id);
                Ok(None)
            }
        }
    }

    /// 持续消费直到通道关闭或收到关闭信号
    pub async fn run(
        &self,
        mut reports: mpsc::Receiver<ExecutorReport>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("执行器回报监听已启动");
        loop {
            tokio::select! {
                report = reports.recv() => {
                    let Some(report) = report else {
                        info!("回报通道已关闭");
                        break;
                    };
                    match self.handle_report(&report).await {
                        Ok(Some(job)) => debug!("任务 {} 当前状态 {}", job.id, job.status),
                        Ok(None) => {}
                        Err(e @ SceneError::IllegalTransition { .. }) => {
                            warn!("回报 {} ({:?}) 与任务状态冲突: {}", report.task_id, report.kind, e);
                        }
                        Err(e) => error!("处理回报 {} 失败: {}", report.task_id, e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("回报监听收到关闭信号");
                    break;
                }
            }
        }
    }
}
