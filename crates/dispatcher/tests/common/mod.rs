#![allow(dead_code)]

use std::sync::Arc;

use scene_domain::entities::{ExecutorReport, ReportKind, TaskHandle};
use scene_domain::metadata::MetadataExtractor;
use scene_domain::state_machine::RetryPolicy;
use scene_dispatcher::{JobStore, TaskCorrelator};
use scene_infrastructure::observability::MetricsRegistry;
use scene_testing_utils::{ContendedJobRepository, ScriptedExecutor};

pub struct Harness {
    pub repo: ContendedJobRepository,
    pub executor: ScriptedExecutor,
    pub metrics: Arc<MetricsRegistry>,
    pub store: Arc<JobStore>,
    pub correlator: Arc<TaskCorrelator>,
}

pub fn harness(max_retries: u32) -> Harness {
    let repo = ContendedJobRepository::new();
    let executor = ScriptedExecutor::new();
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let store = Arc::new(
        JobStore::new(Arc::new(repo.clone()), MetadataExtractor::default())
            .with_metrics(metrics.clone()),
    );
    let correlator = Arc::new(TaskCorrelator::new(
        store.clone(),
        Arc::new(executor.clone()),
        RetryPolicy::new(max_retries, 30, 1800),
    ));
    Harness {
        repo,
        executor,
        metrics,
        store,
        correlator,
    }
}

pub fn report(handle: &TaskHandle, kind: ReportKind) -> ExecutorReport {
    ExecutorReport::new(handle.clone(), kind)
}

/// 指标文本中某一行的值
pub fn metric_value(rendered: &str, name: &str) -> Option<f64> {
    rendered
        .lines()
        .find(|line| line.starts_with(name) && line[name.len()..].starts_with(' '))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}
