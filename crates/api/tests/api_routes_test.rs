use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

use scene_api::{create_routes, AppState};
use scene_dispatcher::{JobStore, TaskCorrelator};
use scene_domain::entities::{ExecutorReport, ReportKind, TaskHandle};
use scene_domain::health::{CheckKind, CheckResult};
use scene_domain::metadata::MetadataExtractor;
use scene_domain::repositories::JobRepository;
use scene_domain::state_machine::RetryPolicy;
use scene_infrastructure::database::InMemoryJobRepository;
use scene_infrastructure::health::HealthAggregator;
use scene_infrastructure::observability::MetricsRegistry;
use scene_testing_utils::{ContendedJobRepository, ScriptedExecutor, StaticProbe};

struct TestApp {
    router: Router,
    executor: ScriptedExecutor,
    reports: mpsc::Receiver<ExecutorReport>,
}

fn aggregator(database: CheckResult, cache: CheckResult) -> HealthAggregator {
    HealthAggregator::new(Duration::from_millis(200))
        .with_probe(Arc::new(StaticProbe::new(CheckKind::Database, database)))
        .with_probe(Arc::new(StaticProbe::new(CheckKind::Cache, cache)))
        .with_probe(Arc::new(StaticProbe::new(
            CheckKind::Disk,
            CheckResult::healthy(),
        )))
        .with_probe(Arc::new(StaticProbe::new(
            CheckKind::Storage,
            CheckResult::healthy(),
        )))
}

fn test_app_with(health: HealthAggregator, metrics: bool, report_buffer: usize) -> TestApp {
    test_app_on(
        Arc::new(InMemoryJobRepository::new()),
        health,
        metrics,
        report_buffer,
    )
}

fn test_app_on(
    repo: Arc<dyn JobRepository>,
    health: HealthAggregator,
    metrics: bool,
    report_buffer: usize,
) -> TestApp {
    let registry = metrics.then(|| Arc::new(MetricsRegistry::new().unwrap()));
    let mut store = JobStore::new(repo, MetadataExtractor::default());
    if let Some(registry) = &registry {
        store = store.with_metrics(registry.clone());
    }
    let store = Arc::new(store);
    let executor = ScriptedExecutor::new();
    let correlator = Arc::new(TaskCorrelator::new(
        store.clone(),
        Arc::new(executor.clone()),
        RetryPolicy::default(),
    ));
    let (reports_tx, reports) = mpsc::channel(report_buffer);

    let state = AppState {
        store,
        correlator,
        health: Arc::new(health),
        metrics: registry,
        reports: reports_tx,
        disk_path: PathBuf::from("."),
    };
    TestApp {
        router: create_routes(state),
        executor,
        reports,
    }
}

fn test_app() -> TestApp {
    test_app_with(
        aggregator(CheckResult::healthy(), CheckResult::healthy()),
        true,
        8,
    )
}

async fn send(router: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, body))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_liveness_does_not_probe() -> Result<()> {
    let app = test_app_with(
        aggregator(CheckResult::unhealthy("down"), CheckResult::healthy()),
        true,
        8,
    );
    let (status, body) = send(&app.router, get("/api/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_detailed_health_degraded_cache() -> Result<()> {
    let app = test_app_with(
        aggregator(CheckResult::healthy(), CheckResult::degraded("slow")),
        true,
        8,
    );
    let (status, body) = send(&app.router, get("/api/health/detailed")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["database"]["status"], "healthy");
    assert_eq!(body["checks"]["redis"]["status"], "degraded");
    assert_eq!(body["checks"]["disk"]["status"], "healthy");
    assert_eq!(body["checks"]["storage"]["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_detailed_health_database_down() -> Result<()> {
    let app = test_app_with(
        aggregator(CheckResult::unhealthy("refused"), CheckResult::healthy()),
        true,
        8,
    );
    let (status, body) = send(&app.router, get("/api/health/detailed")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["detail"], "refused");
    Ok(())
}

#[tokio::test]
async fn test_metrics_exposition() -> Result<()> {
    let app = test_app();
    send(
        &app.router,
        post_json("/api/jobs", json!({"source_ref": "GOES-16_20260214T120000Z.nc"})),
    )
    .await?;

    let response = app.router.clone().oneshot(get("/api/metrics")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await?.to_vec())?;
    assert!(text.contains("scene_jobs_created_total 1"));
    assert!(text.contains("scene_jobs{status=\"pending\"} 1"));

    let disabled = test_app_with(
        aggregator(CheckResult::healthy(), CheckResult::healthy()),
        false,
        8,
    );
    let (status, _) = send(&disabled.router, get("/api/metrics")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_metrics_scrape_survives_stalled_database() -> Result<()> {
    let repo = ContendedJobRepository::new();
    let app = test_app_on(
        Arc::new(repo.clone()),
        aggregator(CheckResult::healthy(), CheckResult::healthy()),
        true,
        8,
    );
    send(
        &app.router,
        post_json("/api/jobs", json!({"source_ref": "GOES-16_20260214T120000Z.nc"})),
    )
    .await?;

    repo.set_latency(Some(Duration::from_secs(30)));
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        app.router.clone().oneshot(get("/api/metrics")),
    )
    .await
    .expect("scrape must not wait for the database")?;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await?.to_vec())?;
    assert!(text.contains("scene_jobs_created_total 1"));
    Ok(())
}

#[tokio::test]
async fn test_create_job_and_duplicate_handling() -> Result<()> {
    let app = test_app();
    let request = json!({"source_ref": "GOES-16_20260214T120000Z.nc"});

    let (status, body) = send(&app.router, post_json("/api/jobs", request.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    let job = &body["data"];
    assert_eq!(job["status"], "pending");
    assert_eq!(job["satellite"], "GOES-16");
    assert_eq!(job["captured_at"], "2026-02-14T12:00:00Z");
    let id = job["id"].as_i64().unwrap();

    let (status, body) = send(&app.router, post_json("/api/jobs", request)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "DUPLICATE_ACTIVE_JOB");
    assert_eq!(body["current_job"]["id"], id);

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/jobs",
            json!({"source_ref": "GOES-16_20260214T120000Z.nc", "dedup": true}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    Ok(())
}

#[tokio::test]
async fn test_create_and_dispatch_in_one_call() -> Result<()> {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/jobs",
            json!({"source_ref": "GOES-18_20260214T060000Z.nc", "name": "dawn", "dispatch": true}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "running");
    assert_eq!(body["data"]["name"], "dawn");
    assert_eq!(body["data"]["task_id"], "task-1");
    assert_eq!(app.executor.submissions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_list_and_get_jobs() -> Result<()> {
    let app = test_app();
    for source in [
        "GOES-18_20260214T180000Z.nc",
        "GOES-16_20260214T060000Z.nc",
        "readme.txt",
    ] {
        send(&app.router, post_json("/api/jobs", json!({"source_ref": source}))).await?;
    }

    let (status, body) = send(&app.router, get("/api/jobs")).await?;
    assert_eq!(status, StatusCode::OK);
    let sources: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["source_ref"].as_str().unwrap())
        .collect();
    assert_eq!(
        sources,
        vec![
            "GOES-16_20260214T060000Z.nc",
            "GOES-18_20260214T180000Z.nc",
            "readme.txt"
        ]
    );

    let (_, body) = send(&app.router, get("/api/jobs?satellite=GOES-18")).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(
        &app.router,
        get("/api/jobs?captured_from=2026-02-14T00:00:00Z&captured_to=2026-02-14T12:00:00Z"),
    )
    .await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["satellite"], "GOES-16");

    let (status, _) = send(&app.router, get("/api/jobs?status=paused")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, get("/api/jobs/999")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "JOB_NOT_FOUND");

    let (status, body) = send(&app.router, get("/api/jobs/1")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], 1);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_and_cancel_endpoints() -> Result<()> {
    let app = test_app();
    let (_, body) = send(
        &app.router,
        post_json("/api/jobs", json!({"source_ref": "GOES-16_20260214T120000Z.nc"})),
    )
    .await?;
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(&app.router, post_empty(&format!("/api/jobs/{id}/dispatch"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "running");

    let (status, body) = send(&app.router, post_empty(&format!("/api/jobs/{id}/dispatch"))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "ILLEGAL_TRANSITION");
    assert_eq!(body["current_job"]["status"], "running");

    let (status, body) = send(&app.router, post_empty(&format!("/api/jobs/{id}/cancel"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(app.executor.cancellations(), vec![TaskHandle::from("task-1")]);

    let (status, _) = send(&app.router, post_empty("/api/jobs/42/cancel")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_executor_reports_are_queued() -> Result<()> {
    let mut app = test_app_with(
        aggregator(CheckResult::healthy(), CheckResult::healthy()),
        true,
        1,
    );

    let (status, _) = send(
        &app.router,
        post_json(
            "/api/executor/reports",
            json!({"task_id": "task-9", "kind": "failure", "detail": "oom"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    // 通道容量为 1，第二条被拒绝
    let (status, _) = send(
        &app.router,
        post_json(
            "/api/executor/reports",
            json!({"task_id": "task-9", "kind": "lost"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let queued = app.reports.recv().await.expect("report queued");
    assert_eq!(queued.task_id, TaskHandle::from("task-9"));
    assert_eq!(queued.kind, ReportKind::Failure);
    assert_eq!(queued.detail.as_deref(), Some("oom"));

    let (status, _) = send(
        &app.router,
        post_json("/api/executor/reports", json!({"task_id": " ", "kind": "success"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_system_status() -> Result<()> {
    let app = test_app();
    let (status, body) = send(&app.router, get("/api/system/status")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["disk_path"], ".");
    assert!(body["data"]["memory_percent"].as_f64().is_some());
    Ok(())
}
