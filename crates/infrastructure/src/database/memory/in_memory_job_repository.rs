use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{Job, JobFilter, JobStatus, TaskHandle},
    repositories::JobRepository,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct JobTable {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
}

impl JobTable {
    fn active_identity_holder(&self, job: &Job) -> Option<&Job> {
        let (satellite, captured_at) = job.identity()?;
        self.jobs.values().find(|existing| {
            existing.id != job.id
                && existing.is_active()
                && existing.identity() == Some((satellite, captured_at))
        })
    }
}

/// 内存任务仓储，单把锁内完成检查与写入
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    table: Arc<Mutex<JobTable>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.lock().await.jobs.len()
    }

    pub async fn all(&self) -> Vec<Job> {
        self.table.lock().await.jobs.values().cloned().collect()
    }

    /// 直接写入记录，不做任何检查；用于测试构造历史数据
    pub async fn insert_raw(&self, job: Job) -> Job {
        let mut table = self.table.lock().await;
        let mut job = job;
        if job.id == 0 {
            table.next_id += 1;
            job.id = table.next_id;
        } else {
            table.next_id = table.next_id.max(job.id);
        }
        table.jobs.insert(job.id, job.clone());
        job
    }

    fn sort(jobs: &mut [Job]) {
        jobs.sort_by(|a, b| {
            a.captured_at
                .is_none()
                .cmp(&b.captured_at.is_none())
                .then(a.captured_at.cmp(&b.captured_at))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> SceneResult<Job> {
        let mut table = self.table.lock().await;
        if job.is_active() && table.active_identity_holder(job).is_some() {
            if let Some((satellite, captured_at)) = job.identity() {
                return Err(SceneError::DuplicateActiveJob {
                    satellite: satellite.to_string(),
                    captured_at: captured_at.to_rfc3339(),
                });
            }
        }

        table.next_id += 1;
        let mut created = job.clone();
        created.id = table.next_id;
        table.jobs.insert(created.id, created.clone());
        debug!("创建任务成功: ID {}", created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SceneResult<Option<Job>> {
        Ok(self.table.lock().await.jobs.get(&id).cloned())
    }

    async fn get_by_task_id(&self, task_id: &TaskHandle) -> SceneResult<Option<Job>> {
        let table = self.table.lock().await;
        Ok(table
            .jobs
            .values()
            .rev()
            .find(|job| job.task_id.as_ref() == Some(task_id))
            .cloned())
    }

    async fn find_active_by_identity(
        &self,
        satellite: &str,
        captured_at: DateTime<Utc>,
    ) -> SceneResult<Option<Job>> {
        let table = self.table.lock().await;
        Ok(table
            .jobs
            .values()
            .find(|job| job.is_active() && job.identity() == Some((satellite, captured_at)))
            .cloned())
    }

    async fn list(&self, filter: &JobFilter) -> SceneResult<Vec<Job>> {
        let mut jobs: Vec<Job> = {
            let table = self.table.lock().await;
            table
                .jobs
                .values()
                .filter(|job| filter.matches(job))
                .cloned()
                .collect()
        };
        Self::sort(&mut jobs);

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter
            .limit
            .filter(|l| *l >= 0)
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    async fn compare_and_swap(&self, current: &Job, next: &Job) -> SceneResult<bool> {
        let mut table = self.table.lock().await;
        let Some(stored) = table.jobs.get(&current.id) else {
            return Ok(false);
        };
        if stored.status != current.status
            || stored.retry_count != current.retry_count
            || stored.task_id != current.task_id
        {
            debug!("任务 {} 状态已被并发修改，放弃写入", current.id);
            return Ok(false);
        }
        if next.is_active() && table.active_identity_holder(next).is_some() {
            if let Some((satellite, captured_at)) = next.identity() {
                return Err(SceneError::DuplicateActiveJob {
                    satellite: satellite.to_string(),
                    captured_at: captured_at.to_rfc3339(),
                });
            }
        }

        if let Some(stored) = table.jobs.get_mut(&current.id) {
            stored.name = next.name.clone();
            stored.task_id = next.task_id.clone();
            stored.status = next.status;
            stored.retry_count = next.retry_count;
            stored.error_detail = next.error_detail.clone();
            // updated_at 只前进不后退
            stored.updated_at = stored.updated_at.max(next.updated_at);
        }
        Ok(true)
    }

    async fn find_stale(
        &self,
        statuses: &[JobStatus],
        updated_before: DateTime<Utc>,
    ) -> SceneResult<Vec<Job>> {
        let table = self.table.lock().await;
        let mut jobs: Vec<Job> = table
            .jobs
            .values()
            .filter(|job| statuses.contains(&job.status) && job.updated_at < updated_before)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn count_by_status(&self) -> SceneResult<Vec<(JobStatus, i64)>> {
        let table = self.table.lock().await;
        let mut counts: HashMap<JobStatus, i64> = HashMap::new();
        for job in table.jobs.values() {
            *counts.entry(job.status).or_default() += 1;
        }
        Ok(JobStatus::ALL
            .into_iter()
            .filter_map(|status| counts.get(&status).map(|count| (status, *count)))
            .collect())
    }
}
