pub mod sqlite_app_setting_repository;
pub mod sqlite_job_repository;

pub use sqlite_app_setting_repository::SqliteAppSettingRepository;
pub use sqlite_job_repository::SqliteJobRepository;
