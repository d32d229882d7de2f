//! 任务生命周期服务
//!
//! 在领域层的状态机和仓储端口之上组装任务存储、执行器关联、
//! 回报监听、孤儿任务回收与到期重试。

pub mod job_store;
pub mod recovery_service;
pub mod report_listener;
pub mod retry_service;
pub mod task_correlator;

pub use job_store::{JobStore, Submission};
pub use recovery_service::{RecoveryReport, RecoveryService};
pub use report_listener::ReportListener;
pub use retry_service::RetryService;
pub use task_correlator::TaskCorrelator;

/// 单次操作内因并发冲突重读记录的最大次数
pub(crate) const MAX_CAS_ATTEMPTS: usize = 8;
