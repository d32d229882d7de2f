//! Test doubles for executor, repository and health probe ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{Job, JobFilter, JobSpec, JobStatus, TaskHandle},
    executor::TaskExecutor,
    health::{CheckKind, CheckResult, HealthProbe},
    repositories::JobRepository,
};
use scene_infrastructure::database::InMemoryJobRepository;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 按脚本返回结果的执行器
///
/// 未设置脚本时依次返回 `task-1`、`task-2` ...
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
    submissions: Arc<Mutex<Vec<JobSpec>>>,
    cancellations: Arc<Mutex<Vec<TaskHandle>>>,
    issued: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_handle(&self, handle: &str) {
        self.script.lock().unwrap().push_back(Ok(handle.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    /// 持续拒绝所有提交
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<JobSpec> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn cancellations(&self) -> Vec<TaskHandle> {
        self.cancellations.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn backend(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, spec: &JobSpec) -> SceneResult<TaskHandle> {
        self.submissions.lock().unwrap().push(spec.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SceneError::ExecutorUnavailable("executor offline".to_string()));
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(handle)) => Ok(TaskHandle::from(handle)),
            Some(Err(message)) => Err(SceneError::ExecutorUnavailable(message)),
            None => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(TaskHandle::from(format!("task-{n}")))
            }
        }
    }

    async fn cancel(&self, handle: &TaskHandle) -> SceneResult<()> {
        self.cancellations.lock().unwrap().push(handle.clone());
        Ok(())
    }
}

type Interference = Box<dyn FnOnce(Job) -> Job + Send>;

/// 可注入并发冲突和故障的任务仓储
///
/// 底层是 [`InMemoryJobRepository`]，语义保持一致。
#[derive(Clone, Default)]
pub struct ContendedJobRepository {
    inner: InMemoryJobRepository,
    interference: Arc<Mutex<VecDeque<Interference>>>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl ContendedJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryJobRepository {
        &self.inner
    }

    /// 在下一次比较并交换之前，先由"另一个写入者"修改存储中的记录
    pub fn interfere_before_next_swap<F>(&self, change: F)
    where
        F: FnOnce(Job) -> Job + Send + 'static,
    {
        self.interference
            .lock()
            .unwrap()
            .push_back(Box::new(change));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 每次访问前先等待 `latency`，模拟卡住的数据库
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn check_available(&self) -> SceneResult<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SceneError::DatabaseOperation("database offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobRepository for ContendedJobRepository {
    async fn create(&self, job: &Job) -> SceneResult<Job> {
        self.check_available().await?;
        self.inner.create(job).await
    }

    async fn get_by_id(&self, id: i64) -> SceneResult<Option<Job>> {
        self.check_available().await?;
        self.inner.get_by_id(id).await
    }

    async fn get_by_task_id(&self, task_id: &TaskHandle) -> SceneResult<Option<Job>> {
        self.check_available().await?;
        self.inner.get_by_task_id(task_id).await
    }

    async fn find_active_by_identity(
        &self,
        satellite: &str,
        captured_at: DateTime<Utc>,
    ) -> SceneResult<Option<Job>> {
        self.check_available().await?;
        self.inner.find_active_by_identity(satellite, captured_at).await
    }

    async fn list(&self, filter: &JobFilter) -> SceneResult<Vec<Job>> {
        self.check_available().await?;
        self.inner.list(filter).await
    }

    async fn compare_and_swap(&self, current: &Job, next: &Job) -> SceneResult<bool> {
        self.check_available().await?;
        let change = self.interference.lock().unwrap().pop_front();
        if let Some(change) = change {
            if let Some(stored) = self.inner.get_by_id(current.id).await? {
                let changed = change(stored.clone());
                self.inner.compare_and_swap(&stored, &changed).await?;
            }
        }
        self.inner.compare_and_swap(current, next).await
    }

    async fn find_stale(
        &self,
        statuses: &[JobStatus],
        updated_before: DateTime<Utc>,
    ) -> SceneResult<Vec<Job>> {
        self.check_available().await?;
        self.inner.find_stale(statuses, updated_before).await
    }

    async fn count_by_status(&self) -> SceneResult<Vec<(JobStatus, i64)>> {
        self.check_available().await?;
        self.inner.count_by_status().await
    }
}

/// 固定返回结果的健康探针，可选延迟
pub struct StaticProbe {
    kind: CheckKind,
    result: SceneResult<CheckResult>,
    delay: Option<Duration>,
}

impl StaticProbe {
    pub fn new(kind: CheckKind, result: CheckResult) -> Self {
        Self {
            kind,
            result: Ok(result),
            delay: None,
        }
    }

    pub fn failing(kind: CheckKind, message: &str) -> Self {
        Self {
            kind,
            result: Err(SceneError::SubsystemProbe {
                subsystem: kind.as_str().to_string(),
                message: message.to_string(),
            }),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn probe(&self) -> SceneResult<CheckResult> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.result {
            Ok(result) => Ok(result.clone()),
            Err(e) => Err(SceneError::SubsystemProbe {
                subsystem: self.kind.as_str().to_string(),
                message: e.to_string(),
            }),
        }
    }
}
