use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use tracing::warn;

use crate::{error::ApiError, error::ApiResult, routes::AppState};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Prometheus exposition, refreshing the per-status gauges first
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let registry = state.metrics.as_ref().ok_or(ApiError::NotFound)?;

    // A stalled database must not hold up the scrape; stale gauges are rendered instead.
    let refresh = state.store.refresh_status_gauges();
    match tokio::time::timeout(state.health.probe_timeout(), refresh).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Failed to refresh job status gauges: {}", e),
        Err(_) => warn!(
            "Refreshing job status gauges timed out after {:?}",
            state.health.probe_timeout()
        ),
    }

    Ok((
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        registry.render(),
    ))
}
