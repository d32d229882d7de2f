pub mod manager;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use memory::{InMemoryAppSettingRepository, InMemoryJobRepository};
pub use postgres::{PostgresAppSettingRepository, PostgresJobRepository};
pub use sqlite::{SqliteAppSettingRepository, SqliteJobRepository};
