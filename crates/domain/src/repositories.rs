use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::SceneResult;

use crate::entities::{AppSetting, Job, JobFilter, JobStatus, TaskHandle};

/// 任务仓储
///
/// 实现必须在存储层保证同一 (satellite, captured_at) 最多一个活跃任务，
/// 冲突时返回 `SceneError::DuplicateActiveJob`。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 插入新任务并返回带 id 的记录
    async fn create(&self, job: &Job) -> SceneResult<Job>;

    async fn get_by_id(&self, id: i64) -> SceneResult<Option<Job>>;

    async fn get_by_task_id(&self, task_id: &TaskHandle) -> SceneResult<Option<Job>>;

    async fn find_active_by_identity(
        &self,
        satellite: &str,
        captured_at: DateTime<Utc>,
    ) -> SceneResult<Option<Job>>;

    /// 按 captured_at 升序（空值在后），再按 created_at、id 排序
    async fn list(&self, filter: &JobFilter) -> SceneResult<Vec<Job>>;

    /// 仅当存储中的 (status, retry_count, task_id) 仍与 `current` 一致时写入 `next`
    ///
    /// 返回 false 表示记录已被并发修改或不存在。
    async fn compare_and_swap(&self, current: &Job, next: &Job) -> SceneResult<bool>;

    /// 状态属于 `statuses` 且 updated_at 早于 `updated_before` 的任务
    async fn find_stale(
        &self,
        statuses: &[JobStatus],
        updated_before: DateTime<Utc>,
    ) -> SceneResult<Vec<Job>>;

    async fn count_by_status(&self) -> SceneResult<Vec<(JobStatus, i64)>>;
}

/// 键值配置仓储
#[async_trait]
pub trait AppSettingRepository: Send + Sync {
    async fn get(&self, key: &str) -> SceneResult<Option<AppSetting>>;

    /// 不存在则插入，存在则覆盖
    async fn set(&self, key: &str, value: serde_json::Value) -> SceneResult<AppSetting>;

    async fn list(&self) -> SceneResult<Vec<AppSetting>>;
}
