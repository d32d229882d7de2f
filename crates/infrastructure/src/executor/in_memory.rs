use async_trait::async_trait;
use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{ExecutorReport, JobSpec, ReportKind, TaskHandle},
    executor::TaskExecutor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// 模拟执行：延迟一半回报 progress，再延迟一半回报 success
#[derive(Clone)]
struct AutoComplete {
    reports: mpsc::Sender<ExecutorReport>,
    delay: Duration,
}

/// 进程内执行器，用于本地运行与测试
///
/// 句柄格式为 `mem-<uuid>`。
#[derive(Clone, Default)]
pub struct InMemoryTaskExecutor {
    submissions: Arc<Mutex<Vec<(TaskHandle, JobSpec)>>>,
    cancellations: Arc<Mutex<Vec<TaskHandle>>>,
    fail_submissions: Arc<AtomicBool>,
    auto_complete: Option<AutoComplete>,
}

impl InMemoryTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_complete(reports: mpsc::Sender<ExecutorReport>, delay: Duration) -> Self {
        Self {
            auto_complete: Some(AutoComplete { reports, delay }),
            ..Self::default()
        }
    }

    /// 之后的提交全部失败，直到再次设为 false
    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    pub async fn submissions(&self) -> Vec<(TaskHandle, JobSpec)> {
        self.submissions.lock().await.clone()
    }

    pub async fn cancellations(&self) -> Vec<TaskHandle> {
        self.cancellations.lock().await.clone()
    }

    pub async fn last_handle(&self) -> Option<TaskHandle> {
        self.submissions
            .lock()
            .await
            .last()
            .map(|(handle, _)| handle.clone())
    }
}

#[async_trait]
impl TaskExecutor for InMemoryTaskExecutor {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn submit(&self, spec: &JobSpec) -> SceneResult<TaskHandle> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(SceneError::ExecutorUnavailable(
                "内存执行器被设置为拒绝提交".to_string(),
            ));
        }

        let handle = TaskHandle::new(format!("mem-{}", Uuid::new_v4()));
        self.submissions
            .lock()
            .await
            .push((handle.clone(), spec.clone()));
        debug!(job_id = spec.job_id, task_id = %handle, "内存执行器接收任务");

        if let Some(auto) = self.auto_complete.clone() {
            let handle = handle.clone();
            tokio::spawn(async move {
                // 句柄在 submit 返回后才写入任务，回报不能抢在前面
                tokio::time::sleep(auto.delay / 2).await;
                let progress = ExecutorReport::new(handle.clone(), ReportKind::Progress);
                if auto.reports.send(progress).await.is_err() {
                    return;
                }
                tokio::time::sleep(auto.delay / 2).await;
                let success = ExecutorReport::new(handle.clone(), ReportKind::Success);
                if auto.reports.send(success).await.is_err() {
                    warn!("回报通道已关闭，丢弃任务 {} 的完成回报", handle);
                }
            });
        }

        Ok(handle)
    }

    async fn cancel(&self, handle: &TaskHandle) -> SceneResult<()> {
        self.cancellations.lock().await.push(handle.clone());
        Ok(())
    }
}
