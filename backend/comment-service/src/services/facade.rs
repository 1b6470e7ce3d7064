/// Client for creation-service's internal façade
///
/// Narrow synchronous calls used to keep the creation's own aggregates in
/// step with its comments. Failures surface to the caller; nothing here
/// retries.
use crate::error::{ServiceError, ServiceResult};
use event_schema::facade::{AdjustmentResult, CommentCountAdjustment, CreationAuthor};
use event_schema::CreationKind;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CreationStatisticsProvider: Send + Sync {
    async fn creation_author(&self, creation_id: i64, creation_type: i16) -> ServiceResult<String>;

    /// Applied at most once per `key`.
    async fn add_creation_comment_count(
        &self,
        creation_id: i64,
        creation_type: i16,
        count: i64,
        key: String,
    ) -> ServiceResult<()>;

    /// Applied at most once per `key`.
    async fn reduce_creation_comment_count(
        &self,
        creation_id: i64,
        creation_type: i16,
        count: i64,
        key: String,
    ) -> ServiceResult<()>;
}

#[derive(Clone)]
pub struct HttpCreationClient {
    client: Client,
    base_url: String,
}

impl HttpCreationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn creation_url(&self, creation_id: i64, creation_type: i16, suffix: &str) -> ServiceResult<String> {
        let kind = CreationKind::from_code(creation_type).ok_or_else(|| {
            ServiceError::ValidationFailed(format!("unknown creation type {}", creation_type))
        })?;
        Ok(format!(
            "{}/internal/creations/{}/{}/{}",
            self.base_url, kind, creation_id, suffix
        ))
    }

    async fn adjust(
        &self,
        creation_id: i64,
        creation_type: i16,
        delta: i64,
        key: String,
    ) -> ServiceResult<()> {
        let url = self.creation_url(creation_id, creation_type, "comment-count")?;
        let body = CommentCountAdjustment {
            delta,
            idempotency_key: key,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("comment count request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(creation_id, status = %status, "Creation façade rejected comment count change");
            return Err(ServiceError::Upstream(format!(
                "comment count for creation {} returned {}",
                creation_id, status
            )));
        }

        let result: AdjustmentResult = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("invalid comment count response: {}", e)))?;
        debug!(
            creation_id,
            delta,
            key = %body.idempotency_key,
            applied = result.applied,
            "Creation comment count adjusted"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl CreationStatisticsProvider for HttpCreationClient {
    async fn creation_author(&self, creation_id: i64, creation_type: i16) -> ServiceResult<String> {
        let url = self.creation_url(creation_id, creation_type, "author")?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("author lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ServiceError::NotFound(format!("creation {}", creation_id))),
            status if status.is_success() => {
                let body: CreationAuthor = response
                    .json()
                    .await
                    .map_err(|e| ServiceError::Upstream(format!("invalid author response: {}", e)))?;
                Ok(body.author)
            }
            status => Err(ServiceError::Upstream(format!(
                "author lookup for creation {} returned {}",
                creation_id, status
            ))),
        }
    }

    async fn add_creation_comment_count(
        &self,
        creation_id: i64,
        creation_type: i16,
        count: i64,
        key: String,
    ) -> ServiceResult<()> {
        self.adjust(creation_id, creation_type, count.abs(), key).await
    }

    async fn reduce_creation_comment_count(
        &self,
        creation_id: i64,
        creation_type: i16,
        count: i64,
        key: String,
    ) -> ServiceResult<()> {
        self.adjust(creation_id, creation_type, -count.abs(), key).await
    }
}
