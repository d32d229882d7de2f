use scene_core::config::DatabaseConfig;
use scene_core::{SceneError, SceneResult};
use scene_domain::repositories::{AppSettingRepository, JobRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::postgres::{PostgresAppSettingRepository, PostgresJobRepository};
use super::schema::{POSTGRES_SCHEMA, SQLITE_SCHEMA};
use super::sqlite::{SqliteAppSettingRepository, SqliteJobRepository};

/// 根据连接串判断数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

#[derive(Clone)]
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    pub async fn connect(config: &DatabaseConfig) -> SceneResult<Self> {
        let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let idle_timeout = Duration::from_secs(config.idle_timeout_seconds);

        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.url)
                    .await
                    .map_err(SceneError::Database)?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let mut options = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout);
                // 内存库只存在于单个连接中
                if config.url.contains(":memory:") {
                    options = options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None);
                }
                let pool = options
                    .connect(&config.url)
                    .await
                    .map_err(SceneError::Database)?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> SceneResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}

/// 统一的数据库管理器
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    /// 建立连接池并初始化表结构
    pub async fn new(config: &DatabaseConfig) -> SceneResult<Self> {
        let pool = DatabasePool::connect(config).await?;
        let manager = Self { pool };
        manager.bootstrap().await?;
        info!(
            database_type = ?manager.database_type(),
            max_connections = config.max_connections,
            "数据库连接已建立"
        );
        Ok(manager)
    }

    pub fn from_pool(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub async fn bootstrap(&self) -> SceneResult<()> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                for statement in POSTGRES_SCHEMA {
                    sqlx::query(statement).execute(pool).await?;
                }
            }
            DatabasePool::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    sqlx::query(statement).execute(pool).await?;
                }
            }
        }
        debug!("数据库表结构初始化完成");
        Ok(())
    }

    pub async fn health_check(&self) -> SceneResult<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn job_repository(&self) -> Arc<dyn JobRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresJobRepository::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteJobRepository::new(pool.clone())),
        }
    }

    pub fn app_setting_repository(&self) -> Arc<dyn AppSettingRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresAppSettingRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => Arc::new(SqliteAppSettingRepository::new(pool.clone())),
        }
    }
}
