use async_trait::async_trait;
use scene_core::SceneResult;

use crate::entities::{JobSpec, TaskHandle};

/// 外部执行器适配器
///
/// 每种后端一个实现，调用方只依赖 `TaskHandle`，不关心句柄格式。
/// 传输层错误统一返回 `SceneError::ExecutorUnavailable`。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn submit(&self, spec: &JobSpec) -> SceneResult<TaskHandle>;

    /// 尽力而为，执行器侧可能已经结束
    async fn cancel(&self, handle: &TaskHandle) -> SceneResult<()>;
}
