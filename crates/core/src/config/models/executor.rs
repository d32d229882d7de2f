use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// 外部执行器后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorBackend {
    /// 通过HTTP提交到处理服务
    Http,
    /// 进程内执行器，仅用于本地运行和测试
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub backend: ExecutorBackend,
    pub endpoint: Option<String>,
    pub request_timeout_seconds: u64,
    /// 执行器回报通道容量
    pub report_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: ExecutorBackend::Memory,
            endpoint: None,
            request_timeout_seconds: 30,
            report_buffer: 1024,
        }
    }
}

impl ConfigValidator for ExecutorConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.backend == ExecutorBackend::Http {
            let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "executor.endpoint is required for the http backend".to_string(),
                )
            })?;
            ValidationUtils::validate_url(endpoint, "executor.endpoint")?;
        }
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "executor.request_timeout_seconds",
        )?;
        ValidationUtils::validate_count(self.report_buffer, "executor.report_buffer")?;
        Ok(())
    }
}
