use async_trait::async_trait;
use chrono::Utc;
use scene_core::SceneResult;
use scene_domain::{entities::AppSetting, repositories::AppSettingRepository};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryAppSettingRepository {
    settings: Arc<RwLock<BTreeMap<String, AppSetting>>>,
}

impl InMemoryAppSettingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppSettingRepository for InMemoryAppSettingRepository {
    async fn get(&self, key: &str) -> SceneResult<Option<AppSetting>> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> SceneResult<AppSetting> {
        let setting = AppSetting {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        self.settings
            .write()
            .await
            .insert(key.to_string(), setting.clone());
        Ok(setting)
    }

    async fn list(&self) -> SceneResult<Vec<AppSetting>> {
        Ok(self.settings.read().await.values().cloned().collect())
    }
}
