/// HTTP handlers for comment-service
///
/// - Comments: drafts, create, delete, agree, lists and statistics
/// - Callbacks: moderation verdict intake
/// - Ops: health, readiness and Prometheus metrics
pub mod callbacks;
pub mod comments;
pub mod ops;

use crate::services::CommentUseCase;
use actix_web::error::{ErrorBadRequest, ErrorUnauthorized};
use actix_web::{web, Error, FromRequest, HttpRequest};
use event_dispatch::EventPublisher;
use fanout_cache::is_member_field;
use futures::future::{ready, Ready};
use std::sync::Arc;

/// Header the gateway sets after authenticating the caller.
pub const CALLER_HEADER: &str = "X-User-Id";

/// Authenticated caller uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl FromRequest for CallerId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(caller_from(req))
    }
}

/// The uuid is embedded in cache feed members, so it must be a plain
/// identifier.
fn caller_from(req: &HttpRequest) -> Result<CallerId, Error> {
    let uuid = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|uuid| !uuid.is_empty())
        .ok_or_else(|| ErrorUnauthorized("Caller identity missing"))?;
    if !is_member_field(uuid) {
        return Err(ErrorBadRequest("Caller identity is not a valid identifier"));
    }
    Ok(CallerId(uuid.to_string()))
}

#[derive(Clone)]
pub struct AppState {
    pub comments: CommentUseCase,
    pub publisher: Arc<dyn EventPublisher>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(ops::health))
        .route("/ready", web::get().to(ops::ready))
        .route("/metrics", web::get().to(ops::metrics))
        .route("/callbacks/review", web::post().to(callbacks::review_result))
        .service(
            web::scope("/api/v1")
                .route("/comments/drafts", web::post().to(comments::create_comment_draft))
                .route("/comments", web::post().to(comments::create_comment))
                .route("/comments/statistics", web::post().to(comments::get_comment_statistics))
                .route("/comments/{id}", web::delete().to(comments::remove_comment))
                .service(
                    web::resource("/comments/{id}/agree")
                        .route(web::put().to(comments::set_comment_agree))
                        .route(web::delete().to(comments::cancel_comment_agree)),
                )
                .route("/comments/{id}/replies", web::get().to(comments::get_sub_comment_list))
                .route("/sub-comments/drafts", web::post().to(comments::create_sub_comment_draft))
                .route("/sub-comments", web::post().to(comments::create_sub_comment))
                .route("/sub-comments/{id}", web::delete().to(comments::remove_sub_comment))
                .route(
                    "/creations/{creation_type}/{creation_id}/comments",
                    web::get().to(comments::get_comment_list),
                )
                .route(
                    "/creations/{creation_type}/{creation_id}/comments/hot",
                    web::get().to(comments::get_comment_hot_list),
                )
                .route("/me/replies", web::get().to(comments::get_user_reply_list))
                .route("/me/replied", web::get().to(comments::get_user_replied_list))
                .route("/me/review-queue", web::get().to(comments::get_review_queue))
                .route(
                    "/users/{uuid}/comment-statistic",
                    web::get().to(comments::get_user_comment_statistic),
                ),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;

    fn status_of(result: Result<CallerId, Error>) -> StatusCode {
        result.unwrap_err().as_response_error().status_code()
    }

    #[test]
    fn test_caller_header_is_trimmed() {
        let req = TestRequest::default()
            .insert_header((CALLER_HEADER, " u-42 "))
            .to_http_request();
        assert_eq!(caller_from(&req).unwrap(), CallerId("u-42".to_string()));
    }

    #[test]
    fn test_missing_caller_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(status_of(caller_from(&req)), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_caller_with_delimiter_is_rejected() {
        let req = TestRequest::default()
            .insert_header((CALLER_HEADER, "u2%evil"))
            .to_http_request();
        assert_eq!(status_of(caller_from(&req)), StatusCode::BAD_REQUEST);
    }
}
