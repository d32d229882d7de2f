use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use scene_domain::health::HealthStatus;

use crate::routes::AppState;

/// 存活检查，不访问任何依赖
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "scene-pipeline",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 聚合健康状态；unhealthy 时返回 503 供编排系统摘除实例
pub async fn detailed_health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}
