//! # Scene API
//!
//! 任务生命周期与健康状态的HTTP接口，基于Axum。
//!
//! ## API 端点
//!
//! ### 健康与监控
//! - `GET /api/health` - 存活检查，不探测依赖
//! - `GET /api/health/detailed` - 聚合健康状态，unhealthy 时返回 503
//! - `GET /api/metrics` - Prometheus 文本格式指标
//! - `GET /api/system/status` - 主机 CPU、内存、磁盘占用
//!
//! ### 任务管理
//! - `POST /api/jobs` - 创建任务
//! - `GET /api/jobs` - 按状态、卫星、拍摄时间过滤任务
//! - `GET /api/jobs/{id}` - 获取任务详情
//! - `POST /api/jobs/{id}/dispatch` - 派发到执行器
//! - `POST /api/jobs/{id}/cancel` - 取消任务
//!
//! ### 执行器回报
//! - `POST /api/executor/reports` - 投递执行器回报
//!
//! ## 错误响应
//!
//! 状态冲突类错误（重复任务、非法状态转换）附带当前任务记录 `current_job`，
//! 调用方可据此在客户端对齐状态。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};
