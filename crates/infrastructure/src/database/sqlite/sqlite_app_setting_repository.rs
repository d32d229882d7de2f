use async_trait::async_trait;
use chrono::Utc;
use scene_core::SceneResult;
use scene_domain::{entities::AppSetting, repositories::AppSettingRepository};
use sqlx::{types::Json, Row, SqlitePool};
use tracing::debug;

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteAppSettingRepository {
    pool: SqlitePool,
}

impl SqliteAppSettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_setting(row: &sqlx::sqlite::SqliteRow) -> SceneResult<AppSetting> {
        let value: Json<serde_json::Value> = row.try_get("value")?;
        Ok(AppSetting {
            key: row.try_get("key")?,
            value: value.0,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AppSettingRepository for SqliteAppSettingRepository {
    async fn get(&self, key: &str) -> SceneResult<Option<AppSetting>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM app_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::setting_database_error(RepositoryOperation::Read, key, e)
            })?;

        row.as_ref().map(Self::row_to_setting).transpose()
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> SceneResult<AppSetting> {
        let row = sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(Json(&value))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::setting_database_error(RepositoryOperation::Upsert, key, e))?;

        debug!("写入配置项成功: {}", key);
        Self::row_to_setting(&row)
    }

    async fn list(&self) -> SceneResult<Vec<AppSetting>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM app_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        let settings: SceneResult<Vec<AppSetting>> =
            rows.iter().map(Self::row_to_setting).collect();
        settings
    }
}
