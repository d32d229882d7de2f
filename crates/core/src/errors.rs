use thiserror::Error;

/// 任务生命周期子系统错误类型定义
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("已存在活动任务: 卫星 {satellite}, 采集时间 {captured_at}")]
    DuplicateActiveJob {
        satellite: String,
        captured_at: String,
    },

    #[error("非法状态转换: 任务 {id} {from} -> {to}")]
    IllegalTransition { id: i64, from: String, to: String },

    #[error("执行器不可用: {0}")]
    ExecutorUnavailable(String),

    #[error("子系统探测失败: {subsystem} - {message}")]
    SubsystemProbe { subsystem: String, message: String },

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的任务参数: {0}")]
    InvalidJobParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SceneError {
    /// 可以按退避策略重试的瞬时错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SceneError::ExecutorUnavailable(_) | SceneError::Database(_) | SceneError::Cache(_)
        )
    }

    /// 由调用方输入导致、应以4xx返回的错误
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SceneError::JobNotFound { .. }
                | SceneError::DuplicateActiveJob { .. }
                | SceneError::IllegalTransition { .. }
                | SceneError::InvalidJobParams(_)
        )
    }

    pub fn illegal_transition(id: i64, from: impl ToString, to: impl ToString) -> Self {
        SceneError::IllegalTransition {
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SceneResult<T> = std::result::Result<T, SceneError>;
