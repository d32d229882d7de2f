use async_trait::async_trait;
use reqwest::StatusCode;
use scene_core::{SceneError, SceneResult};
use scene_domain::{
    entities::{JobSpec, TaskHandle},
    executor::TaskExecutor,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: String,
}

/// 通过 HTTP 提交任务的执行器适配器
///
/// `POST {endpoint}/tasks` 返回 `{"task_id": ".."}`，`DELETE {endpoint}/tasks/{id}` 取消任务。
pub struct HttpTaskExecutor {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpTaskExecutor {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> SceneResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SceneError::ExecutorUnavailable(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TaskExecutor for HttpTaskExecutor {
    fn backend(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, spec: &JobSpec) -> SceneResult<TaskHandle> {
        let url = format!("{}/tasks", self.endpoint);

        let response = self
            .http_client
            .post(&url)
            .json(spec)
            .send()
            .await
            .map_err(|e| {
                error!("提交任务 {} 到执行器失败: {}", spec.job_id, e);
                SceneError::ExecutorUnavailable(format!("执行器连接失败: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("执行器拒绝任务 {}: HTTP {} - {}", spec.job_id, status, body);
            return Err(SceneError::ExecutorUnavailable(format!(
                "执行器返回 HTTP {status} - {body}"
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SceneError::ExecutorUnavailable(format!("执行器响应格式错误: {e}")))?;
        if body.task_id.trim().is_empty() {
            return Err(SceneError::ExecutorUnavailable(
                "执行器返回空的任务句柄".to_string(),
            ));
        }

        info!(job_id = spec.job_id, task_id = %body.task_id, "任务已提交到执行器");
        Ok(TaskHandle::from(body.task_id))
    }

    async fn cancel(&self, handle: &TaskHandle) -> SceneResult<()> {
        let url = format!("{}/tasks/{}", self.endpoint, handle);

        match self.http_client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("执行器已取消任务 {}", handle);
                Ok(())
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!("执行器上不存在任务 {}，视为已取消", handle);
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                warn!("执行器取消任务 {} 失败: HTTP {}", handle, status);
                Err(SceneError::ExecutorUnavailable(format!(
                    "取消任务失败: HTTP {status}"
                )))
            }
            Err(e) => {
                warn!("取消任务 {} 时无法连接执行器: {}", handle, e);
                Err(SceneError::ExecutorUnavailable(format!(
                    "执行器连接失败: {e}"
                )))
            }
        }
    }
}
