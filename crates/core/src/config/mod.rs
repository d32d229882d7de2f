//! 配置管理
//!
//! 配置按以下顺序加载并逐层覆盖：
//! 1. 内置默认值（`AppConfig::default()`）
//! 2. TOML配置文件
//! 3. 环境变量（前缀 `SCENE_`，嵌套字段使用 `__` 分隔）

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Configuration(err.to_string())
    }
}

impl From<ConfigError> for crate::SceneError {
    fn from(err: ConfigError) -> Self {
        crate::SceneError::Configuration(err.to_string())
    }
}
