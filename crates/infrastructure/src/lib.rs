pub mod database;
pub mod error_handling;
pub mod executor;
pub mod health;
pub mod observability;

pub use database::*;
pub use executor::{build_executor, HttpTaskExecutor, InMemoryTaskExecutor};
pub use health::{build_health_aggregator, HealthAggregator};
pub use observability::*;
