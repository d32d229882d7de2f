use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scene_core::SceneResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 子系统检查项
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Database,
    /// 缓存当前由 Redis 提供，对外沿用 redis 键名
    #[serde(rename = "redis")]
    Cache,
    Disk,
    Storage,
}

impl CheckKind {
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Database,
        CheckKind::Cache,
        CheckKind::Disk,
        CheckKind::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Database => "database",
            CheckKind::Cache => "redis",
            CheckKind::Disk => "disk",
            CheckKind::Storage => "storage",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub latency_ms: u64,
}

impl CheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: None,
            latency_ms: 0,
        }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            detail: Some(detail.into()),
            latency_ms: 0,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            detail: Some(detail.into()),
            latency_ms: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// 聚合后的健康报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<CheckKind, CheckResult>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_checks(checks: BTreeMap<CheckKind, CheckResult>) -> Self {
        Self {
            status: composite_status(&checks),
            checks,
            checked_at: Utc::now(),
        }
    }
}

/// 组合规则：全部 healthy 才是 healthy；数据库 unhealthy 或缺失即 unhealthy；其余为 degraded
pub fn composite_status(checks: &BTreeMap<CheckKind, CheckResult>) -> HealthStatus {
    let database = checks
        .get(&CheckKind::Database)
        .map(|c| c.status)
        .unwrap_or(HealthStatus::Unhealthy);
    if database == HealthStatus::Unhealthy {
        return HealthStatus::Unhealthy;
    }
    if checks.values().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

/// 单个子系统探针，超时由聚合器负责
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn kind(&self) -> CheckKind;

    /// 返回 Err 时聚合器记为 unhealthy
    async fn probe(&self) -> SceneResult<CheckResult>;
}
