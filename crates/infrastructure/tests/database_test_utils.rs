use chrono::{DateTime, TimeZone, Utc};
use scene_core::config::DatabaseConfig;
use scene_domain::entities::Job;
use scene_domain::metadata::SceneMetadata;
use scene_infrastructure::database::DatabaseManager;

pub async fn sqlite_manager() -> anyhow::Result<DatabaseManager> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    };
    Ok(DatabaseManager::new(&config).await?)
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, hour, minute, 0).unwrap()
}

pub fn scene(satellite: Option<&str>, captured_at: Option<DateTime<Utc>>) -> Job {
    let source = match (satellite, captured_at) {
        (Some(s), Some(t)) => format!("{s}_{}.nc", t.format("%Y%m%dT%H%M%SZ")),
        (Some(s), None) => format!("{s}_unknown.nc"),
        _ => "unparseable.nc".to_string(),
    };
    Job::new(
        None,
        source,
        SceneMetadata {
            satellite: satellite.map(str::to_string),
            captured_at,
        },
    )
}
