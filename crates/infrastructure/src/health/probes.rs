//! 子系统探针：数据库、Redis 缓存、本地磁盘与对象存储挂载

use async_trait::async_trait;
use scene_core::config::{CacheConfig, HealthConfig};
use scene_core::{SceneError, SceneResult};
use scene_domain::entities::setting_keys;
use scene_domain::health::{CheckKind, CheckResult, HealthProbe};
use scene_domain::repositories::AppSettingRepository;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::database::DatabasePool;

pub struct DatabaseProbe {
    pool: DatabasePool,
}

impl DatabaseProbe {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Database
    }

    async fn probe(&self) -> SceneResult<CheckResult> {
        self.pool.health_check().await.map_err(|e| SceneError::SubsystemProbe {
            subsystem: "database".to_string(),
            message: e.to_string(),
        })?;
        Ok(CheckResult::healthy())
    }
}

pub struct RedisProbe {
    client: Option<redis::Client>,
}

impl RedisProbe {
    /// 缓存未启用时探针始终返回 healthy
    pub fn new(config: &CacheConfig) -> SceneResult<Self> {
        if !config.enabled {
            return Ok(Self { client: None });
        }
        let client =
            redis::Client::open(config.url.as_str()).map_err(|e| SceneError::Cache(e.to_string()))?;
        Ok(Self {
            client: Some(client),
        })
    }
}

#[async_trait]
impl HealthProbe for RedisProbe {
    fn kind(&self) -> CheckKind {
        CheckKind::Cache
    }

    async fn probe(&self) -> SceneResult<CheckResult> {
        let Some(client) = &self.client else {
            return Ok(CheckResult::healthy().with_detail("cache disabled"));
        };

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SceneError::Cache(e.to_string()))?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SceneError::Cache(e.to_string()))?;

        if pong == "PONG" {
            Ok(CheckResult::healthy())
        } else {
            Ok(CheckResult::degraded(format!("unexpected PING reply: {pong}")))
        }
    }
}

/// 剩余空间阈值（百分比）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeSpaceThresholds {
    pub warn_percent: f64,
    pub critical_percent: f64,
}

impl FreeSpaceThresholds {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            warn_percent: config.warn_free_percent,
            critical_percent: config.critical_free_percent,
        }
    }

    pub fn classify(&self, free_percent: f64) -> CheckResult {
        let detail = format!("{free_percent:.1}% free");
        if free_percent < self.critical_percent {
            CheckResult::unhealthy(format!(
                "{detail}, below critical threshold {:.1}%",
                self.critical_percent
            ))
        } else if free_percent < self.warn_percent {
            CheckResult::degraded(format!(
                "{detail}, below warning threshold {:.1}%",
                self.warn_percent
            ))
        } else {
            CheckResult::healthy().with_detail(detail)
        }
    }
}

/// 基于文件系统剩余空间的探针，阈值可由 AppSetting 覆盖
pub struct FreeSpaceProbe {
    kind: CheckKind,
    path: PathBuf,
    defaults: FreeSpaceThresholds,
    settings: Option<Arc<dyn AppSettingRepository>>,
}

impl FreeSpaceProbe {
    pub fn new(kind: CheckKind, path: impl Into<PathBuf>, defaults: FreeSpaceThresholds) -> Self {
        Self {
            kind,
            path: path.into(),
            defaults,
            settings: None,
        }
    }

    pub fn disk(config: &HealthConfig) -> Self {
        Self::new(
            CheckKind::Disk,
            &config.disk_path,
            FreeSpaceThresholds::from_config(config),
        )
    }

    pub fn storage(config: &HealthConfig) -> Self {
        Self::new(
            CheckKind::Storage,
            &config.storage_path,
            FreeSpaceThresholds::from_config(config),
        )
    }

    pub fn with_settings(mut self, settings: Arc<dyn AppSettingRepository>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 读取失败或配置非法时回退到静态配置
    pub async fn thresholds(&self) -> FreeSpaceThresholds {
        let Some(settings) = &self.settings else {
            return self.defaults;
        };

        let warn_percent = read_percent(settings.as_ref(), setting_keys::HEALTH_WARN_FREE_PERCENT)
            .await
            .unwrap_or(self.defaults.warn_percent);
        let critical_percent =
            read_percent(settings.as_ref(), setting_keys::HEALTH_CRITICAL_FREE_PERCENT)
                .await
                .unwrap_or(self.defaults.critical_percent);

        if critical_percent > warn_percent {
            warn!(
                warn_percent,
                critical_percent, "剩余空间阈值配置倒置，使用默认阈值"
            );
            return self.defaults;
        }
        FreeSpaceThresholds {
            warn_percent,
            critical_percent,
        }
    }
}

async fn read_percent(settings: &dyn AppSettingRepository, key: &str) -> Option<f64> {
    match settings.get(key).await {
        Ok(Some(setting)) => match setting.as_f64() {
            Some(value) if (0.0..=100.0).contains(&value) => Some(value),
            _ => {
                warn!(key, value = %setting.value, "配置项不是合法的百分比，忽略");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "读取配置项失败，使用默认值");
            None
        }
    }
}

#[async_trait]
impl HealthProbe for FreeSpaceProbe {
    fn kind(&self) -> CheckKind {
        self.kind
    }

    async fn probe(&self) -> SceneResult<CheckResult> {
        let thresholds = self.thresholds().await;
        let path = self.path.clone();
        let subsystem = self.kind.as_str().to_string();

        let (available, total) = tokio::task::spawn_blocking(move || {
            Ok::<_, std::io::Error>((fs2::available_space(&path)?, fs2::total_space(&path)?))
        })
        .await
        .map_err(|e| SceneError::SubsystemProbe {
            subsystem: subsystem.clone(),
            message: e.to_string(),
        })?
        .map_err(|e| SceneError::SubsystemProbe {
            subsystem: subsystem.clone(),
            message: format!("{}: {e}", self.path.display()),
        })?;

        if total == 0 {
            return Ok(CheckResult::unhealthy(format!(
                "{} reports zero capacity",
                self.path.display()
            )));
        }

        let free_percent = available as f64 / total as f64 * 100.0;
        Ok(thresholds.classify(free_percent))
    }
}
