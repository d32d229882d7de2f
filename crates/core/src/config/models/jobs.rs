use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// 任务生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 指数退避基础间隔（秒）
    pub backoff_base_seconds: u64,
    /// 指数退避最大间隔（秒）
    pub backoff_max_seconds: u64,
    /// running/retrying 状态超过该时长未更新即视为孤儿任务（秒）
    pub orphan_timeout_seconds: u64,
    /// 孤儿任务扫描间隔（秒）
    pub sweep_interval_seconds: u64,
    /// 重试任务扫描间隔（秒）
    pub retry_scan_interval_seconds: u64,
    /// 已知卫星标识，按顺序匹配
    pub known_satellites: Vec<String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_seconds: 30,
            backoff_max_seconds: 1800,
            orphan_timeout_seconds: 600,
            sweep_interval_seconds: 60,
            retry_scan_interval_seconds: 15,
            known_satellites: vec![
                "GOES-16".to_string(),
                "GOES-17".to_string(),
                "GOES-18".to_string(),
                "GOES-19".to_string(),
            ],
        }
    }
}

impl ConfigValidator for JobsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_retries > 100 {
            return Err(ConfigError::Validation(
                "jobs.max_retries must be less than or equal to 100".to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.backoff_base_seconds,
            "jobs.backoff_base_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.backoff_max_seconds,
            "jobs.backoff_max_seconds",
        )?;
        if self.backoff_base_seconds > self.backoff_max_seconds {
            return Err(ConfigError::Validation(
                "jobs.backoff_base_seconds must be less than or equal to backoff_max_seconds"
                    .to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.orphan_timeout_seconds,
            "jobs.orphan_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.sweep_interval_seconds,
            "jobs.sweep_interval_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.retry_scan_interval_seconds,
            "jobs.retry_scan_interval_seconds",
        )?;
        for satellite in &self.known_satellites {
            ValidationUtils::validate_not_empty(satellite, "jobs.known_satellites")?;
        }
        Ok(())
    }
}
