//! 健康检查：子系统探针与综合判定

pub mod aggregator;
pub mod probes;

pub use aggregator::HealthAggregator;
pub use probes::{DatabaseProbe, FreeSpaceProbe, FreeSpaceThresholds, RedisProbe};

use scene_core::config::{CacheConfig, HealthConfig};
use scene_core::SceneResult;
use scene_domain::repositories::AppSettingRepository;
use std::sync::Arc;
use std::time::Duration;

use crate::database::DatabasePool;

/// 组装默认的四项检查：database、redis、disk、storage
pub fn build_health_aggregator(
    pool: DatabasePool,
    cache: &CacheConfig,
    health: &HealthConfig,
    settings: Arc<dyn AppSettingRepository>,
) -> SceneResult<HealthAggregator> {
    Ok(
        HealthAggregator::new(Duration::from_millis(health.probe_timeout_ms))
            .with_probe(Arc::new(DatabaseProbe::new(pool)))
            .with_probe(Arc::new(RedisProbe::new(cache)?))
            .with_probe(Arc::new(
                FreeSpaceProbe::disk(health).with_settings(settings.clone()),
            ))
            .with_probe(Arc::new(
                FreeSpaceProbe::storage(health).with_settings(settings),
            )),
    )
}
