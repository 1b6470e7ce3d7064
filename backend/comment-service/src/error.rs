/// Error types for comment-service
///
/// Use-case errors carry the cause for logging and map to a stable
/// `{ "code", "detail" }` body for HTTP clients.
use crate::repository::RepoError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use event_dispatch::{HandlerError, PublishError};
use fanout_cache::CacheError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Draft conflict: {0}")]
    DraftConflict(String),

    #[error("Create failed: {0}")]
    CreateFailed(#[source] RepoError),

    #[error("Cache failed: {0}")]
    CacheFailed(#[from] CacheError),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(#[from] PublishError),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("No authority: {0}")]
    NoAuthority(String),

    #[error("Database error: {0}")]
    Database(#[source] RepoError),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => ServiceError::NotFound(what),
            RepoError::DraftNotPending(id) => {
                ServiceError::DraftConflict(format!("draft {} was already sent", id))
            }
            RepoError::NotOwner { uuid, entity } => {
                ServiceError::NoAuthority(format!("{} does not own {}", uuid, entity))
            }
            other => ServiceError::Database(other),
        }
    }
}

impl ServiceError {
    /// Wrap a repository failure raised while creating an entity.
    pub fn create_failed(err: RepoError) -> Self {
        match err {
            RepoError::Database(_) | RepoError::Timeout(_) => ServiceError::CreateFailed(err),
            other => other.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::DraftConflict(_) => "draft_conflict",
            ServiceError::CreateFailed(_) => "create_failed",
            ServiceError::CacheFailed(_) => "cache_failed",
            ServiceError::DispatchFailed(_) => "dispatch_failed",
            ServiceError::ValidationFailed(_) => "validation_failed",
            ServiceError::NoAuthority(_) => "no_authority",
            ServiceError::Database(_) => "database_error",
            ServiceError::Upstream(_) => "upstream_error",
        }
    }
}

/// Event handlers: invalid input is dropped, everything else is retried.
impl From<ServiceError> for HandlerError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ValidationFailed(_) | ServiceError::NoAuthority(_) => {
                HandlerError::Malformed(err.to_string())
            }
            other => HandlerError::Retryable(anyhow::Error::new(other)),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    detail: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::DraftConflict(_) => StatusCode::CONFLICT,
            ServiceError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ServiceError::NoAuthority(_) => StatusCode::FORBIDDEN,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::CreateFailed(_)
            | ServiceError::CacheFailed(_)
            | ServiceError::DispatchFailed(_)
            | ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal causes stay in the logs.
        let detail = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(ErrorBody {
            code: self.code(),
            detail,
        })
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
