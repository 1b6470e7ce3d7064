/// Moderation client for articles, columns and talks
use crate::error::{ServiceError, ServiceResult};
use event_dispatch::EventPublisher;
use event_schema::{EventEnvelope, EventMode, ReviewRequestEvent, ReviewResultEvent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentReviewer: Send + Sync {
    /// Submit text and return the reviewer's job id.
    async fn submit(&self, request: ReviewRequestEvent) -> ServiceResult<String>;
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    text: &'a str,
    callback_url: &'a str,
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Clone)]
pub struct HttpReviewer {
    client: Client,
    url: String,
    callback_url: String,
}

impl HttpReviewer {
    pub fn new(url: impl Into<String>, callback_url: impl Into<String>, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            callback_url: callback_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ContentReviewer for HttpReviewer {
    async fn submit(&self, request: ReviewRequestEvent) -> ServiceResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&SubmitBody {
                text: &request.text,
                callback_url: &self.callback_url,
                headers: request.correlation().to_headers(),
            })
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("review submission failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "reviewer returned {}",
                response.status()
            )));
        }

        let SubmitResponse { job_id } = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid reviewer response: {}", e)))?;
        info!(%job_id, subject = %request.subject, creation_id = request.entity_id, "Submitted creation for review");
        Ok(job_id)
    }
}

/// Publishes a passing verdict for every submission.
pub struct AutoPassReviewer {
    publisher: Arc<dyn EventPublisher>,
}

impl AutoPassReviewer {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait::async_trait]
impl ContentReviewer for AutoPassReviewer {
    async fn submit(&self, request: ReviewRequestEvent) -> ServiceResult<String> {
        let job_id = format!("auto-{}-{}", request.subject, request.entity_id);
        let verdict = ReviewResultEvent {
            job_id: job_id.clone(),
            passed: true,
            label: "auto".to_string(),
            result: "pass".to_string(),
            correlation: request.correlation().to_headers(),
        };
        let envelope = EventEnvelope::new(crate::SERVICE_NAME, EventMode::CreationReviewResult, &verdict)
            .map_err(|e| ServiceError::DispatchFailed(e.into()))?;
        self.publisher.publish(&job_id, &envelope).await?;
        Ok(job_id)
    }
}
