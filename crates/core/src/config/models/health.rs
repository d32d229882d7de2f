use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// 健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// 单个子检查的超时时间（毫秒）
    pub probe_timeout_ms: u64,
    /// 本地工作目录所在磁盘
    pub disk_path: String,
    /// 对象存储挂载目录
    pub storage_path: String,
    /// 剩余空间低于该百分比时为 degraded
    pub warn_free_percent: f64,
    /// 剩余空间低于该百分比时为 unhealthy
    pub critical_free_percent: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1500,
            disk_path: "./data".to_string(),
            storage_path: "./storage".to_string(),
            warn_free_percent: 15.0,
            critical_free_percent: 5.0,
        }
    }
}

impl ConfigValidator for HealthConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.probe_timeout_ms == 0 || self.probe_timeout_ms > 10_000 {
            return Err(ConfigError::Validation(
                "health.probe_timeout_ms must be between 1 and 10000".to_string(),
            ));
        }
        ValidationUtils::validate_not_empty(&self.disk_path, "health.disk_path")?;
        ValidationUtils::validate_not_empty(&self.storage_path, "health.storage_path")?;
        ValidationUtils::validate_percent(self.warn_free_percent, "health.warn_free_percent")?;
        ValidationUtils::validate_percent(
            self.critical_free_percent,
            "health.critical_free_percent",
        )?;
        if self.critical_free_percent > self.warn_free_percent {
            return Err(ConfigError::Validation(
                "health.critical_free_percent must be less than or equal to warn_free_percent"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_config_validation() {
        assert!(HealthConfig::default().validate().is_ok());

        let inverted = HealthConfig {
            warn_free_percent: 5.0,
            critical_free_percent: 10.0,
            ..HealthConfig::default()
        };
        assert!(inverted.validate().is_err());

        let no_timeout = HealthConfig {
            probe_timeout_ms: 0,
            ..HealthConfig::default()
        };
        assert!(no_timeout.validate().is_err());
    }
}
