use anyhow::Result;
use chrono::{Duration, Utc};
use scene_core::SceneError;
use scene_domain::entities::{JobFilter, JobStatus, TaskHandle};
use scene_domain::repositories::{AppSettingRepository, JobRepository};
use scene_domain::state_machine::JobStateMachine;
use scene_infrastructure::database::{InMemoryAppSettingRepository, InMemoryJobRepository};
use serde_json::json;
use std::sync::Arc;

mod database_test_utils;
use database_test_utils::{at, scene, sqlite_manager};

/// 同一组断言分别在 SQLite 与内存实现上运行
async fn backends() -> Result<Vec<(&'static str, Arc<dyn JobRepository>)>> {
    let manager = sqlite_manager().await?;
    Ok(vec![
        ("sqlite", manager.job_repository()),
        ("memory", Arc::new(InMemoryJobRepository::new())),
    ])
}

#[tokio::test]
async fn test_create_and_get_roundtrip() -> Result<()> {
    for (name, repo) in backends().await? {
        let job = scene(Some("GOES-16"), Some(at(12, 0)));
        let created = repo.create(&job).await?;
        assert!(created.id > 0, "{name}");
        assert_eq!(created.status, JobStatus::Pending, "{name}");
        assert_eq!(created.satellite.as_deref(), Some("GOES-16"), "{name}");
        assert_eq!(created.captured_at, Some(at(12, 0)), "{name}");

        let fetched = repo.get_by_id(created.id).await?.expect("job exists");
        assert_eq!(fetched.name, created.name, "{name}");
        assert_eq!(fetched.captured_at, created.captured_at, "{name}");
        assert!(fetched.updated_at >= fetched.created_at, "{name}");

        assert!(repo.get_by_id(created.id + 1000).await?.is_none(), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_duplicate_active_identity_rejected() -> Result<()> {
    for (name, repo) in backends().await? {
        let first = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;
        let err = repo
            .create(&scene(Some("GOES-16"), Some(at(12, 0))))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SceneError::DuplicateActiveJob { .. }),
            "{name}: {err:?}"
        );

        // 其它卫星或缺失身份的任务不受影响
        repo.create(&scene(Some("GOES-18"), Some(at(12, 0)))).await?;
        repo.create(&scene(None, None)).await?;
        repo.create(&scene(None, None)).await?;

        // 终态后允许重新提交同一身份
        let cancelled = JobStateMachine::transition(&first, JobStatus::Cancelled, None, Utc::now())?;
        assert!(repo.compare_and_swap(&first, &cancelled).await?, "{name}");
        let again = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;
        assert_ne!(again.id, first.id, "{name}");

        let active = repo
            .find_active_by_identity("GOES-16", at(12, 0))
            .await?
            .expect("active job");
        assert_eq!(active.id, again.id, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_list_orders_by_capture_time_nulls_last() -> Result<()> {
    for (name, repo) in backends().await? {
        let undated = repo.create(&scene(Some("GOES-16"), None)).await?;
        let late = repo.create(&scene(Some("GOES-16"), Some(at(14, 0)))).await?;
        let early = repo.create(&scene(Some("GOES-18"), Some(at(9, 30)))).await?;

        let ids: Vec<i64> = repo
            .list(&JobFilter::default())
            .await?
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id, undated.id], "{name}");

        let goes16: Vec<i64> = repo
            .list(&JobFilter::default().with_satellite("GOES-16"))
            .await?
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(goes16, vec![late.id, undated.id], "{name}");

        let window = repo
            .list(&JobFilter::default().with_time_range(Some(at(9, 30)), Some(at(14, 0))))
            .await?;
        assert_eq!(window.len(), 1, "{name}");
        assert_eq!(window[0].id, early.id, "{name}");

        let paged = repo
            .list(&JobFilter {
                limit: Some(1),
                offset: Some(1),
                ..JobFilter::default()
            })
            .await?;
        assert_eq!(paged.len(), 1, "{name}");
        assert_eq!(paged[0].id, late.id, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_compare_and_swap_detects_stale_writer() -> Result<()> {
    for (name, repo) in backends().await? {
        let job = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;
        let running =
            JobStateMachine::start(&job, TaskHandle::from("t-1"), Utc::now() + Duration::seconds(1))?;
        assert!(repo.compare_and_swap(&job, &running).await?, "{name}");

        // 基于旧快照的第二次写入必须失败
        let cancelled = JobStateMachine::transition(&job, JobStatus::Cancelled, None, Utc::now())?;
        assert!(!repo.compare_and_swap(&job, &cancelled).await?, "{name}");

        let stored = repo.get_by_id(job.id).await?.expect("job exists");
        assert_eq!(stored.status, JobStatus::Running, "{name}");
        assert_eq!(stored.task_id, Some(TaskHandle::from("t-1")), "{name}");

        let by_task = repo
            .get_by_task_id(&TaskHandle::from("t-1"))
            .await?
            .expect("lookup by handle");
        assert_eq!(by_task.id, job.id, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_compare_and_swap_keeps_newest_updated_at() -> Result<()> {
    for (name, repo) in backends().await? {
        let job = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;
        let running = JobStateMachine::start(&job, TaskHandle::from("t-1"), Utc::now())?;
        assert!(repo.compare_and_swap(&job, &running).await?, "{name}");

        let mut newer = running.clone();
        newer.updated_at = running.updated_at + Duration::minutes(10);
        assert!(repo.compare_and_swap(&running, &newer).await?, "{name}");

        // 同一快照的迟到写入不能把时间写回去
        let mut older = running.clone();
        older.updated_at = running.updated_at + Duration::minutes(1);
        assert!(repo.compare_and_swap(&running, &older).await?, "{name}");

        let stored = repo.get_by_id(job.id).await?.expect("job exists");
        assert!(
            (stored.updated_at - newer.updated_at).num_milliseconds().abs() < 1,
            "{name}: {}",
            stored.updated_at
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_compare_and_swap_checks_task_handle() -> Result<()> {
    for (name, repo) in backends().await? {
        let job = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;
        let first = JobStateMachine::start(&job, TaskHandle::from("t-1"), Utc::now())?;
        assert!(repo.compare_and_swap(&job, &first).await?);

        // running(t-1) -> retrying -> running(t-2)，状态相同但句柄不同
        let retrying = JobStateMachine::transition(&first, JobStatus::Retrying, None, Utc::now())?;
        assert!(repo.compare_and_swap(&first, &retrying).await?);
        let second = JobStateMachine::start(&retrying, TaskHandle::from("t-2"), Utc::now())?;
        assert!(repo.compare_and_swap(&retrying, &second).await?);

        let mut stale_touch = first.clone();
        stale_touch.touch(Utc::now() + Duration::seconds(5));
        assert!(!repo.compare_and_swap(&first, &stale_touch).await?, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_find_stale_by_status_and_age() -> Result<()> {
    for (name, repo) in backends().await? {
        let old = repo.create(&scene(Some("GOES-16"), Some(at(10, 0)))).await?;
        let fresh = repo.create(&scene(Some("GOES-16"), Some(at(11, 0)))).await?;
        let pending = repo.create(&scene(Some("GOES-16"), Some(at(12, 0)))).await?;

        let now = Utc::now();
        let mut stale_running = JobStateMachine::start(&old, TaskHandle::from("a"), now)?;
        stale_running.updated_at = now - Duration::minutes(15);
        assert!(repo.compare_and_swap(&old, &stale_running).await?);
        let fresh_running = JobStateMachine::start(&fresh, TaskHandle::from("b"), now)?;
        assert!(repo.compare_and_swap(&fresh, &fresh_running).await?);

        let stale = repo
            .find_stale(
                &[JobStatus::Running, JobStatus::Retrying],
                now - Duration::minutes(10),
            )
            .await?;
        let ids: Vec<i64> = stale.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![old.id], "{name}");
        assert!(!ids.contains(&pending.id), "{name}");

        assert!(repo.find_stale(&[], now).await?.is_empty(), "{name}");

        let counts = repo.count_by_status().await?;
        let running = counts
            .iter()
            .find(|(s, _)| *s == JobStatus::Running)
            .map(|(_, c)| *c);
        assert_eq!(running, Some(2), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_app_settings_upsert() -> Result<()> {
    let manager = sqlite_manager().await?;
    let backends: Vec<Arc<dyn AppSettingRepository>> = vec![
        manager.app_setting_repository(),
        Arc::new(InMemoryAppSettingRepository::new()),
    ];

    for repo in backends {
        assert!(repo.get("health.warn_free_percent").await?.is_none());

        repo.set("health.warn_free_percent", json!(20.0)).await?;
        repo.set("health.warn_free_percent", json!(25.5)).await?;
        repo.set("jobs.orphan_timeout_seconds", json!(900)).await?;

        let warn = repo.get("health.warn_free_percent").await?.expect("setting");
        assert_eq!(warn.as_f64(), Some(25.5));

        let keys: Vec<String> = repo.list().await?.into_iter().map(|s| s.key).collect();
        assert_eq!(
            keys,
            vec![
                "health.warn_free_percent".to_string(),
                "jobs.orphan_timeout_seconds".to_string()
            ]
        );
    }
    Ok(())
}
