use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use scene_core::SceneError;
use scene_domain::entities::{JobSpec, TaskHandle};
use scene_domain::executor::TaskExecutor;
use scene_infrastructure::executor::HttpTaskExecutor;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct StubExecutor {
    submitted: Arc<Mutex<Vec<Value>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

async fn submit(State(stub): State<StubExecutor>, Json(body): Json<Value>) -> Json<Value> {
    let job_id = body["job_id"].as_i64().unwrap_or_default();
    stub.submitted.lock().unwrap().push(body);
    Json(json!({ "task_id": format!("remote-{job_id}") }))
}

async fn cancel(State(stub): State<StubExecutor>, Path(id): Path<String>) -> StatusCode {
    if id == "gone" {
        return StatusCode::NOT_FOUND;
    }
    if id == "broken" {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    stub.cancelled.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn spawn_stub() -> Result<(String, StubExecutor)> {
    let stub = StubExecutor::default();
    let app = Router::new()
        .route("/tasks", post(submit))
        .route("/tasks/{id}", delete(cancel))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), stub))
}

fn spec(job_id: i64) -> JobSpec {
    JobSpec {
        job_id,
        name: "OR_ABI-L1b-RadF".to_string(),
        source_ref: "s3://goes/GOES-16_20260214T120000Z.nc".to_string(),
        satellite: Some("GOES-16".to_string()),
        captured_at: None,
        attempt: 1,
    }
}

#[tokio::test]
async fn test_submit_returns_remote_handle() -> Result<()> {
    let (endpoint, stub) = spawn_stub().await?;
    let executor = HttpTaskExecutor::new(endpoint, Duration::from_secs(5))?;
    assert!(!executor.endpoint().ends_with('/'));
    assert_eq!(executor.backend(), "http");

    let handle = executor.submit(&spec(42)).await?;
    assert_eq!(handle, TaskHandle::from("remote-42"));

    let submitted = stub.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["satellite"], "GOES-16");
    assert_eq!(submitted[0]["attempt"], 1);
    Ok(())
}

#[tokio::test]
async fn test_cancel_treats_missing_task_as_done() -> Result<()> {
    let (endpoint, stub) = spawn_stub().await?;
    let executor = HttpTaskExecutor::new(endpoint, Duration::from_secs(5))?;

    executor.cancel(&TaskHandle::from("remote-7")).await?;
    executor.cancel(&TaskHandle::from("gone")).await?;
    assert_eq!(stub.cancelled.lock().unwrap().clone(), vec!["remote-7"]);

    let err = executor
        .cancel(&TaskHandle::from("broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::ExecutorUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_executor_is_unavailable() -> Result<()> {
    // 绑定后立即释放端口，保证无人监听
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let executor = HttpTaskExecutor::new(format!("http://{addr}"), Duration::from_secs(2))?;
    let err = executor.submit(&spec(1)).await.unwrap_err();
    assert!(matches!(err, SceneError::ExecutorUnavailable(_)));
    assert!(err.is_retryable());
    Ok(())
}
