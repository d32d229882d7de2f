//! 外部执行器适配器

pub mod http;
pub mod in_memory;

pub use http::HttpTaskExecutor;
pub use in_memory::InMemoryTaskExecutor;

use scene_core::config::{ExecutorBackend, ExecutorConfig};
use scene_core::{SceneError, SceneResult};
use scene_domain::entities::ExecutorReport;
use scene_domain::executor::TaskExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 内存后端模拟执行耗时
const MEMORY_COMPLETION_DELAY: Duration = Duration::from_secs(2);

/// 按配置构建执行器；内存后端把模拟回报写入 `reports`
pub fn build_executor(
    config: &ExecutorConfig,
    reports: mpsc::Sender<ExecutorReport>,
) -> SceneResult<Arc<dyn TaskExecutor>> {
    match config.backend {
        ExecutorBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                SceneError::Configuration("http 执行器需要配置 executor.endpoint".to_string())
            })?;
            Ok(Arc::new(HttpTaskExecutor::new(
                endpoint,
                Duration::from_secs(config.request_timeout_seconds),
            )?))
        }
        ExecutorBackend::Memory => Ok(Arc::new(InMemoryTaskExecutor::with_auto_complete(
            reports,
            MEMORY_COMPLETION_DELAY,
        ))),
    }
}
