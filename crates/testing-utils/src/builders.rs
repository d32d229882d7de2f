//! Test data builders for job records

use chrono::{DateTime, Duration, TimeZone, Utc};
use scene_domain::entities::{Job, JobStatus, TaskHandle};

/// 2026-02-14 当天指定时刻，测试中的默认拍摄日期
pub fn scene_time(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, hour, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            job: Job {
                id: 0,
                name: "GOES-16_20260214T120000Z".to_string(),
                source_ref: "GOES-16_20260214T120000Z.nc".to_string(),
                task_id: None,
                status: JobStatus::Pending,
                satellite: Some("GOES-16".to_string()),
                captured_at: Some(scene_time(12, 0)),
                retry_count: 0,
                error_detail: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_source_ref(mut self, source_ref: &str) -> Self {
        self.job.source_ref = source_ref.to_string();
        self
    }

    pub fn with_satellite(mut self, satellite: &str) -> Self {
        self.job.satellite = Some(satellite.to_string());
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.job.captured_at = Some(captured_at);
        self
    }

    /// 文件名无法解析时的任务
    pub fn without_identity(mut self) -> Self {
        self.job.satellite = None;
        self.job.captured_at = None;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.job.task_id = Some(TaskHandle::from(task_id));
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    pub fn with_error_detail(mut self, detail: &str) -> Self {
        self.job.error_detail = Some(detail.to_string());
        self
    }

    /// 创建于 `age` 之前且此后未再更新
    pub fn aged(mut self, age: Duration) -> Self {
        let at = Utc::now() - age;
        self.job.created_at = at;
        self.job.updated_at = at;
        self
    }

    /// 创建时间不变，最后更新于 `age` 之前
    pub fn updated_ago(mut self, age: Duration) -> Self {
        let at = Utc::now() - age;
        if self.job.created_at > at {
            self.job.created_at = at;
        }
        self.job.updated_at = at;
        self
    }

    pub fn running(self, task_id: &str) -> Self {
        self.with_status(JobStatus::Running).with_task_id(task_id)
    }

    pub fn retrying(self, task_id: &str, retry_count: u32) -> Self {
        self.with_status(JobStatus::Retrying)
            .with_task_id(task_id)
            .with_retry_count(retry_count)
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
