use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use scene_core::SceneResult;
use scene_domain::{
    entities::{setting_keys, ExecutorReport, Job, JobStatus, ReportKind},
    repositories::AppSettingRepository,
};
use scene_infrastructure::observability::MetricsRegistry;

use crate::task_correlator::TaskCorrelator;

/// 一轮孤儿任务回收的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// 超时未更新的任务数
    pub examined: usize,
    /// 因此转为 retrying/failed 的任务
    pub recovered: Vec<Job>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// 孤儿任务回收
///
/// 长时间停留在 running 的任务视为执行端已丢失，按 `lost` 回报处理。
pub struct RecoveryService {
    correlator: Arc<TaskCorrelator>,
    settings: Option<Arc<dyn AppSettingRepository>>,
    metrics: Option<Arc<MetricsRegistry>>,
    default_timeout: Duration,
    interval: Duration,
}

impl RecoveryService {
    pub fn new(correlator: Arc<TaskCorrelator>, orphan_timeout: Duration, interval: Duration) -> Self {
        Self {
            correlator,
            settings: None,
            metrics: None,
            default_timeout: orphan_timeout,
            interval,
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn AppSettingRepository>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 当前生效的超时时间，配置项优先
    pub async fn orphan_timeout(&self) -> Duration {
        let Some(settings) = &self.settings else {
            return self.default_timeout;
        };
        match settings.get(setting_keys::JOBS_ORPHAN_TIMEOUT_SECONDS).await {
            Ok(Some(setting)) => match setting.as_u64() {
                Some(seconds) if seconds > 0 => Duration::from_secs(seconds),
                _ => {
                    warn!("配置项 {} 的值无效，使用默认超时", setting.key);
                    self.default_timeout
                }
            },
            Ok(None) => self.default_timeout,
            Err(e) => {
                warn!("读取孤儿任务超时配置失败: {}", e);
                self.default_timeout
            }
        }
    }

    /// 执行一轮回收
    pub async fn sweep(&self) -> SceneResult<RecoveryReport> {
        let started = Instant::now();
        let timeout = self.orphan_timeout().await;
        let orphans = self.correlator.store().find_orphaned(timeout).await?;

        let mut report = RecoveryReport {
            examined: orphans.len(),
            ..RecoveryReport::default()
        };

        for job in orphans {
            // retrying 任务等待重试服务处理
            if job.status != JobStatus::Running {
                continue;
            }
            let Some(handle) = job.task_id.clone() else {
                warn!("运行中的任务 {} 没有任务句柄", job.id);
                continue;
            };

            let lost = ExecutorReport::new(handle, ReportKind::Lost);
            match self.correlator.reconcile(&job, &lost).await {
                Ok(updated) if updated.status != job.status => {
                    warn!(
                        "任务 {} 超过 {} 秒未更新，已转为 {}",
                        job.id,
                        timeout.as_secs(),
                        updated.status
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_job_orphaned();
                    }
                    report.recovered.push(updated);
                }
                Ok(_) => debug!("任务 {} 已在回收前更新", job.id),
                Err(e) => {
                    error!("回收任务 {} 失败: {}", job.id, e);
                    report.errors.push(format!("任务 {}: {}", job.id, e));
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        if !report.recovered.is_empty() || !report.errors.is_empty() {
            info!(
                examined = report.examined,
                recovered = report.recovered.len(),
                errors = report.errors.len(),
                "孤儿任务回收完成"
            );
        }
        Ok(report)
    }

    /// 按间隔循环回收直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("孤儿任务回收失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("孤儿任务回收收到关闭信号");
                    break;
                }
            }
        }
    }
}
