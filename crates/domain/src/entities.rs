use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metadata::SceneMetadata;

/// 卫星场景处理任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// 仅用于展示，不做唯一性约束
    pub name: String,
    pub source_ref: String,
    pub task_id: Option<TaskHandle>,
    pub status: JobStatus,
    pub satellite: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Retrying,
        JobStatus::Cancelled,
    ];

    /// 占用 (satellite, captured_at) 身份的状态
    pub const ACTIVE: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Running, JobStatus::Retrying];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<JobStatus> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 外部执行器返回的任务句柄，对本系统不透明
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Job {
    /// 新建 pending 任务，id 由存储层分配
    pub fn new(name: Option<String>, source_ref: impl Into<String>, metadata: SceneMetadata) -> Self {
        let source_ref = source_ref.into();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| derive_name(&source_ref));
        let now = Utc::now();
        Self {
            id: 0,
            name,
            source_ref,
            task_id: None,
            status: JobStatus::Pending,
            satellite: metadata.satellite,
            captured_at: metadata.captured_at,
            retry_count: 0,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 两个字段都存在时才参与去重
    pub fn identity(&self) -> Option<(&str, DateTime<Utc>)> {
        match (&self.satellite, self.captured_at) {
            (Some(satellite), Some(captured_at)) => Some((satellite.as_str(), captured_at)),
            _ => None,
        }
    }

    /// updated_at 只前进不后退
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.updated_at - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

/// 从源文件路径推导默认名称：取文件名并去掉扩展名
pub fn derive_name(source_ref: &str) -> String {
    let file_name = source_ref
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_ref);
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    if stem.is_empty() {
        "job".to_string()
    } else {
        stem.to_string()
    }
}

/// 任务列表查询条件，时间范围为 [captured_from, captured_to)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub satellite: Option<String>,
    pub captured_from: Option<DateTime<Utc>>,
    pub captured_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_satellite(mut self, satellite: impl Into<String>) -> Self {
        self.satellite = Some(satellite.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.captured_from = from;
        self.captured_to = to;
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(satellite) = &self.satellite {
            if job.satellite.as_deref() != Some(satellite.as_str()) {
                return false;
            }
        }
        if self.captured_from.is_some() || self.captured_to.is_some() {
            let Some(captured_at) = job.captured_at else {
                return false;
            };
            if self.captured_from.is_some_and(|from| captured_at < from) {
                return false;
            }
            if self.captured_to.is_some_and(|to| captured_at >= to) {
                return false;
            }
        }
        true
    }
}

/// 提交给执行器的任务描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: i64,
    pub name: String,
    pub source_ref: String,
    pub satellite: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    /// 第几次执行，从 1 开始
    pub attempt: u32,
}

impl From<&Job> for JobSpec {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            source_ref: job.source_ref.clone(),
            satellite: job.satellite.clone(),
            captured_at: job.captured_at,
            attempt: job.retry_count + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Progress,
    Success,
    Failure,
    Lost,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Progress => "progress",
            ReportKind::Success => "success",
            ReportKind::Failure => "failure",
            ReportKind::Lost => "lost",
        }
    }
}

/// 执行器回报，至少一次投递，同一任务内有序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorReport {
    pub task_id: TaskHandle,
    pub kind: ReportKind,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ExecutorReport {
    pub fn new(task_id: TaskHandle, kind: ReportKind) -> Self {
        Self {
            task_id,
            kind,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// 运行时可覆盖的配置项键名
pub mod setting_keys {
    pub const HEALTH_WARN_FREE_PERCENT: &str = "health.warn_free_percent";
    pub const HEALTH_CRITICAL_FREE_PERCENT: &str = "health.critical_free_percent";
    pub const JOBS_ORPHAN_TIMEOUT_SECONDS: &str = "jobs.orphan_timeout_seconds";
}

/// 键值配置项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl AppSetting {
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.value.as_u64()
    }
}
