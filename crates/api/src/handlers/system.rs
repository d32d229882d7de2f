use axum::{extract::State, response::IntoResponse};
use serde::Serialize;
use std::path::Path;
use sysinfo::System;
use tracing::warn;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 主机资源占用，单位为百分比
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub cpu_percent: f32,
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub disk_percent: Option<f64>,
    pub disk_path: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

fn disk_usage_percent(path: &Path) -> std::io::Result<f64> {
    let total = fs2::total_space(path)?;
    let available = fs2::available_space(path)?;
    if total == 0 {
        return Ok(0.0);
    }
    Ok((total - available.min(total)) as f64 / total as f64 * 100.0)
}

/// 获取主机 CPU、内存与磁盘占用
pub async fn system_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut system = System::new();
    system.refresh_cpu_usage();
    // CPU 占用需要两次采样
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu_usage();
    system.refresh_memory();

    let memory_total = system.total_memory();
    let memory_used = system.used_memory();
    let memory_percent = if memory_total > 0 {
        memory_used as f64 / memory_total as f64 * 100.0
    } else {
        0.0
    };

    let disk_path = state.disk_path.clone();
    let disk_percent = match tokio::task::spawn_blocking({
        let disk_path = disk_path.clone();
        move || disk_usage_percent(&disk_path)
    })
    .await
    {
        Ok(Ok(percent)) => Some(percent),
        Ok(Err(e)) => {
            warn!("读取 {} 的磁盘容量失败: {}", disk_path.display(), e);
            None
        }
        Err(e) => {
            warn!("磁盘容量统计任务异常: {}", e);
            None
        }
    };

    Ok(success(SystemStatus {
        cpu_percent: system.global_cpu_usage(),
        memory_percent,
        memory_used_bytes: memory_used,
        memory_total_bytes: memory_total,
        disk_percent,
        disk_path: disk_path.display().to_string(),
        timestamp: chrono::Utc::now(),
    }))
}
