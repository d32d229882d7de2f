//! 内存仓储实现，语义与 SQL 实现一致

pub mod in_memory_app_setting_repository;
pub mod in_memory_job_repository;

pub use in_memory_app_setting_repository::InMemoryAppSettingRepository;
pub use in_memory_job_repository::InMemoryJobRepository;
