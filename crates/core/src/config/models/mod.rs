pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod executor;
pub mod health;
pub mod jobs;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::{CacheConfig, DatabaseConfig};
pub use executor::{ExecutorBackend, ExecutorConfig};
pub use health::HealthConfig;
pub use jobs::JobsConfig;
