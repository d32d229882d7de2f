use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scene_api::{create_routes, AppState};
use scene_core::AppConfig;
use scene_dispatcher::{JobStore, RecoveryService, ReportListener, RetryService, TaskCorrelator};
use scene_domain::{entities::ExecutorReport, metadata::MetadataExtractor, state_machine::RetryPolicy};
use scene_infrastructure::{
    database::DatabaseManager, executor::build_executor, health::build_health_aggregator,
    health::HealthAggregator, observability::MetricsRegistry,
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use tracing::{error, info};

/// 主应用程序
///
/// 组装存储、执行器、后台服务和API，`run` 消费自身直到收到关闭信号。
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    store: Arc<JobStore>,
    correlator: Arc<TaskCorrelator>,
    health: Arc<HealthAggregator>,
    metrics: Option<Arc<MetricsRegistry>>,
    recovery: Arc<RecoveryService>,
    retry: Arc<RetryService>,
    reports_tx: mpsc::Sender<ExecutorReport>,
    reports_rx: mpsc::Receiver<ExecutorReport>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("连接数据库: {}", mask_database_url(&config.database.url));
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        let settings = database.app_setting_repository();

        let metrics = if config.observability.metrics_enabled {
            Some(Arc::new(
                MetricsRegistry::new().context("创建指标注册表失败")?,
            ))
        } else {
            None
        };

        let mut store = JobStore::new(
            database.job_repository(),
            MetadataExtractor::new(config.jobs.known_satellites.clone()),
        );
        if let Some(metrics) = &metrics {
            store = store.with_metrics(Arc::clone(metrics));
        }
        let store = Arc::new(store);

        let (reports_tx, reports_rx) = mpsc::channel(config.executor.report_buffer);
        let executor =
            build_executor(&config.executor, reports_tx.clone()).context("创建执行器失败")?;

        let policy = RetryPolicy::new(
            config.jobs.max_retries,
            config.jobs.backoff_base_seconds,
            config.jobs.backoff_max_seconds,
        );
        let correlator = Arc::new(TaskCorrelator::new(Arc::clone(&store), executor, policy));

        let health = Arc::new(
            build_health_aggregator(
                database.pool().clone(),
                &config.cache,
                &config.health,
                Arc::clone(&settings),
            )
            .context("创建健康检查失败")?,
        );

        let mut recovery = RecoveryService::new(
            Arc::clone(&correlator),
            Duration::from_secs(config.jobs.orphan_timeout_seconds),
            Duration::from_secs(config.jobs.sweep_interval_seconds),
        )
        .with_settings(settings);
        if let Some(metrics) = &metrics {
            recovery = recovery.with_metrics(Arc::clone(metrics));
        }

        let retry = RetryService::new(
            Arc::clone(&correlator),
            Duration::from_secs(config.jobs.retry_scan_interval_seconds),
        );

        Ok(Self {
            config,
            database,
            store,
            correlator,
            health,
            metrics,
            recovery: Arc::new(recovery),
            retry: Arc::new(retry),
            reports_tx,
            reports_rx,
        })
    }

    /// 运行应用程序
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let Self {
            config,
            database,
            store,
            correlator,
            health,
            metrics,
            recovery,
            retry,
            reports_tx,
            reports_rx,
        } = self;

        let mut handles = Vec::new();

        let listener = ReportListener::new(Arc::clone(&correlator));
        let listener_shutdown = shutdown_rx.resubscribe();
        handles.push(tokio::spawn(async move {
            listener.run(reports_rx, listener_shutdown).await;
        }));

        let recovery_shutdown = shutdown_rx.resubscribe();
        handles.push(tokio::spawn(async move {
            recovery.run(recovery_shutdown).await;
        }));

        let retry_shutdown = shutdown_rx.resubscribe();
        handles.push(tokio::spawn(async move {
            retry.run(retry_shutdown).await;
        }));

        if config.api.enabled {
            let state = AppState {
                store,
                correlator,
                health,
                metrics,
                reports: reports_tx,
                disk_path: PathBuf::from(&config.health.disk_path),
            };
            let app = create_routes(state);

            let tcp = TcpListener::bind(&config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", config.api.bind_address))?;
            info!("API服务器启动在 http://{}", config.api.bind_address);

            let mut api_shutdown = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let server = axum::serve(tcp, app.into_make_service()).with_graceful_shutdown(
                    async move {
                        let _ = api_shutdown.recv().await;
                        info!("API服务器收到关闭信号");
                    },
                );
                if let Err(e) = server.await {
                    error!("API服务器运行失败: {}", e);
                }
            }));
        } else {
            info!("API服务器已禁用");
            drop(reports_tx);
        }

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号，等待后台服务停止");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台服务异常退出: {}", e);
            }
        }

        database.close().await;
        info!("所有组件已停止");
        Ok(())
    }
}

/// 屏蔽数据库URL中的密码
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // scheme 后的冒号不是密码分隔符
            if url[colon_pos + 1..].starts_with("//") {
                return url.to_string();
            }
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
