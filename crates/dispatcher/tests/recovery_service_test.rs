use anyhow::Result;
use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use scene_domain::entities::{setting_keys, JobStatus};
use scene_domain::repositories::AppSettingRepository;
use scene_domain::state_machine::LOST_DETAIL;
use scene_dispatcher::RecoveryService;
use scene_infrastructure::database::InMemoryAppSettingRepository;
use scene_testing_utils::JobBuilder;
use tokio::sync::broadcast;

mod common;
use common::{harness, metric_value};

const TEN_MINUTES: StdDuration = StdDuration::from_secs(600);

#[tokio::test]
async fn test_sweep_recovers_stale_running_job() -> Result<()> {
    let h = harness(3);
    let orphan = h
        .repo
        .inner()
        .insert_raw(
            JobBuilder::new()
                .running("t-1")
                .updated_ago(Duration::minutes(15))
                .build(),
        )
        .await;
    let healthy = h
        .repo
        .inner()
        .insert_raw(
            JobBuilder::new()
                .with_satellite("GOES-18")
                .running("t-2")
                .updated_ago(Duration::minutes(1))
                .build(),
        )
        .await;

    let service = RecoveryService::new(h.correlator.clone(), TEN_MINUTES, TEN_MINUTES)
        .with_metrics(h.metrics.clone());
    let report = service.sweep().await?;

    assert_eq!(report.examined, 1);
    assert!(report.errors.is_empty());
    assert_eq!(report.recovered.len(), 1);
    assert_eq!(report.recovered[0].id, orphan.id);

    let recovered = h.store.get(orphan.id).await?;
    assert_eq!(recovered.status, JobStatus::Retrying);
    assert_eq!(recovered.error_detail.as_deref(), Some(LOST_DETAIL));
    assert_eq!(h.store.get(healthy.id).await?.status, JobStatus::Running);
    assert_eq!(
        metric_value(&h.metrics.render(), "scene_jobs_orphaned_total"),
        Some(1.0)
    );

    // 第二轮不会重复处理
    let again = service.sweep().await?;
    assert!(again.recovered.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sweep_fails_orphan_without_retry_budget() -> Result<()> {
    let h = harness(2);
    let orphan = h
        .repo
        .inner()
        .insert_raw(
            JobBuilder::new()
                .running("t-3")
                .with_retry_count(2)
                .updated_ago(Duration::minutes(30))
                .build(),
        )
        .await;

    let service = RecoveryService::new(h.correlator.clone(), TEN_MINUTES, TEN_MINUTES);
    service.sweep().await?;

    let failed = h.store.get(orphan.id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_sweep_leaves_retrying_jobs_to_retry_service() -> Result<()> {
    let h = harness(3);
    let waiting = h
        .repo
        .inner()
        .insert_raw(
            JobBuilder::new()
                .retrying("t-4", 1)
                .updated_ago(Duration::minutes(20))
                .build(),
        )
        .await;

    let service = RecoveryService::new(h.correlator.clone(), TEN_MINUTES, TEN_MINUTES);
    let report = service.sweep().await?;
    assert_eq!(report.examined, 1);
    assert!(report.recovered.is_empty());
    assert_eq!(h.store.get(waiting.id).await?, waiting);
    Ok(())
}

#[tokio::test]
async fn test_orphan_timeout_setting_override() -> Result<()> {
    let h = harness(3);
    h.repo
        .inner()
        .insert_raw(
            JobBuilder::new()
                .running("t-5")
                .updated_ago(Duration::minutes(15))
                .build(),
        )
        .await;

    let settings = Arc::new(InMemoryAppSettingRepository::new());
    settings
        .set(setting_keys::JOBS_ORPHAN_TIMEOUT_SECONDS, json!(1200))
        .await?;
    let service = RecoveryService::new(h.correlator.clone(), TEN_MINUTES, TEN_MINUTES)
        .with_settings(settings.clone());

    assert_eq!(service.orphan_timeout().await, StdDuration::from_secs(1200));
    assert_eq!(service.sweep().await?.examined, 0);

    // 非法值回退到默认超时
    settings
        .set(setting_keys::JOBS_ORPHAN_TIMEOUT_SECONDS, json!("soon"))
        .await?;
    assert_eq!(service.orphan_timeout().await, TEN_MINUTES);
    assert_eq!(service.sweep().await?.recovered.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness(3);
    let service = Arc::new(RecoveryService::new(
        h.correlator.clone(),
        TEN_MINUTES,
        StdDuration::from_millis(10),
    ));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = {
        let service = service.clone();
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };
    tokio::time::sleep(StdDuration::from_millis(30)).await;
    shutdown_tx.send(()).unwrap();

    let joined = tokio::time::timeout(StdDuration::from_secs(1), handle).await;
    assert!(joined.is_ok());
}
