use scene_domain::health::{CheckKind, CheckResult, HealthProbe, HealthReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 并发执行所有探针并给出综合结论
///
/// 每个探针在独立任务中运行并受单独超时约束；超时、出错或 panic 都记为 unhealthy，
/// `check()` 本身不会失败。
pub struct HealthAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            probe_timeout,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub async fn check(&self) -> HealthReport {
        let runs = self.probes.iter().map(|probe| {
            let probe = Arc::clone(probe);
            let timeout = self.probe_timeout;
            async move { (probe.kind(), run_probe(probe, timeout).await) }
        });

        let checks: BTreeMap<CheckKind, CheckResult> =
            futures::future::join_all(runs).await.into_iter().collect();
        let report = HealthReport::from_checks(checks);
        debug!(status = %report.status, "健康检查完成");
        report
    }
}

async fn run_probe(probe: Arc<dyn HealthProbe>, timeout: Duration) -> CheckResult {
    let kind = probe.kind();
    let started = Instant::now();
    let mut handle = tokio::spawn(async move { probe.probe().await });

    let result = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(e))) => {
            warn!(check = %kind, error = %e, "子系统检查失败");
            CheckResult::unhealthy(e.to_string())
        }
        Ok(Err(join_error)) => {
            warn!(check = %kind, error = %join_error, "子系统检查异常退出");
            CheckResult::unhealthy(format!("probe aborted: {join_error}"))
        }
        Err(_) => {
            handle.abort();
            warn!(check = %kind, timeout_ms = timeout.as_millis() as u64, "子系统检查超时");
            CheckResult::unhealthy(format!("timed out after {} ms", timeout.as_millis()))
        }
    };

    result.with_latency(started.elapsed().as_millis() as u64)
}
