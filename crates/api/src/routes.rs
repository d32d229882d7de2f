use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use scene_dispatcher::{JobStore, TaskCorrelator};
use scene_domain::entities::ExecutorReport;
use scene_infrastructure::health::HealthAggregator;
use scene_infrastructure::observability::MetricsRegistry;

use crate::handlers::{
    health::{detailed_health, health_check},
    jobs::{cancel_job, create_job, dispatch_job, get_job, list_jobs},
    metrics::metrics,
    reports::submit_report,
    system::system_status,
};
use crate::middleware::{cors_layer, trace_layer};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub correlator: Arc<TaskCorrelator>,
    pub health: Arc<HealthAggregator>,
    pub metrics: Option<Arc<MetricsRegistry>>,
    pub reports: mpsc::Sender<ExecutorReport>,
    /// 系统状态接口统计磁盘占用的目录
    pub disk_path: PathBuf,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查与监控
        .route("/api/health", get(health_check))
        .route("/api/health/detailed", get(detailed_health))
        .route("/api/metrics", get(metrics))
        .route("/api/system/status", get(system_status))
        // 任务管理
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/dispatch", post(dispatch_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        // 执行器回报
        .route("/api/executor/reports", post(submit_report))
        .layer(trace_layer())
        .layer(cors_layer())
        .with_state(state)
}
