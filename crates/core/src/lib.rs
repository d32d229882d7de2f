//! 核心基础设施：错误类型、配置与日志初始化

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigResult, ConfigValidator};
pub use errors::*;
pub use logging::{init_logging, parse_log_format};
