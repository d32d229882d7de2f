pub mod postgres_app_setting_repository;
pub mod postgres_job_repository;

pub use postgres_app_setting_repository::PostgresAppSettingRepository;
pub use postgres_job_repository::PostgresJobRepository;
