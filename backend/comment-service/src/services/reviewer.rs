/// External moderation boundary
use crate::error::{ServiceError, ServiceResult};
use event_dispatch::EventPublisher;
use event_schema::{EventEnvelope, EventMode, ReviewRequestEvent, ReviewResultEvent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Submits text for moderation. The verdict arrives later through the
/// review callback, carrying the correlation headers sent here.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentReviewer: Send + Sync {
    /// Returns the reviewer's job id.
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

/// HTTP moderation API client.
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
        let body = SubmitBody {
            text: &request.text,
            callback_url: &self.callback_url,
            headers: request.correlation().to_headers(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("review submission failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!("reviewer returned {}", status)));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid reviewer response: {}", e)))?;
        info!(
            job_id = %submitted.job_id,
            subject = %request.subject,
            entity_id = request.entity_id,
            "Submitted content for review"
        );
        Ok(submitted.job_id)
    }
}

/// Passes everything by publishing the verdict straight onto the bus. Used
/// when no reviewer is configured.
pub struct AutoPassReviewer {
    publisher: Arc<dyn EventPublisher>,
    source: &'static str,
    result_mode: EventMode,
}

impl AutoPassReviewer {
    pub fn new(publisher: Arc<dyn EventPublisher>, source: &'static str, result_mode: EventMode) -> Self {
        Self {
            publisher,
            source,
            result_mode,
        }
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
        let envelope = EventEnvelope::new(self.source, self.result_mode, &verdict)
            .map_err(|e| ServiceError::DispatchFailed(e.into()))?;
        self.publisher
            .publish(&request.entity_id.to_string(), &envelope)
            .await?;
        Ok(job_id)
    }
}
