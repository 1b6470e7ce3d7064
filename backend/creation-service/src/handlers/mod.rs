//! HTTP surface of creation-service.
//!
//! Public routes live under `/api/v1`, the façade comment-service calls
//! under `/internal`. Numeric ids and kind names share the `/creations/`
//! prefix; the id routes only match digits, so they are registered first.
pub mod callbacks;
pub mod creations;
pub mod facade;
pub mod ops;

use crate::services::CreationUseCase;
use actix_web::error::{ErrorBadRequest, ErrorUnauthorized};
use actix_web::{web, Error, FromRequest, HttpRequest};
use event_dispatch::EventPublisher;
use fanout_cache::is_member_field;
use futures::future::{ready, Ready};
use std::sync::Arc;

/// Header the gateway sets after authenticating the caller.
pub const CALLER_HEADER: &str = "X-User-Id";

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
    pub creations: CreationUseCase,
    pub publisher: Arc<dyn EventPublisher>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(ops::health))
        .route("/ready", web::get().to(ops::ready))
        .route("/metrics", web::get().to(ops::metrics))
        .route("/callbacks/review", web::post().to(callbacks::review_result))
        .service(
            web::scope("/api/v1")
                .route("/creations/drafts", web::post().to(creations::create_draft))
                .service(
                    web::resource(r"/creations/{id:\d+}")
                        .route(web::put().to(creations::edit_creation))
                        .route(web::delete().to(creations::delete_creation)),
                )
                .service(
                    web::resource(r"/creations/{id:\d+}/agree")
                        .route(web::put().to(creations::set_agree))
                        .route(web::delete().to(creations::cancel_agree)),
                )
                .service(
                    web::resource(r"/creations/{id:\d+}/collect")
                        .route(web::put().to(creations::set_collect))
                        .route(web::delete().to(creations::cancel_collect)),
                )
                .route(r"/creations/{id:\d+}/view", web::post().to(creations::add_view))
                .service(
                    web::resource("/creations/{kind}")
                        .route(web::get().to(creations::get_creation_list))
                        .route(web::post().to(creations::create_creation)),
                )
                .route("/creations/{kind}/hot", web::get().to(creations::get_creation_hot_list))
                .route(
                    "/creations/{kind}/statistics",
                    web::post().to(creations::get_creation_statistics),
                )
                .route(
                    "/users/{uuid}/creations/{kind}",
                    web::get().to(creations::get_user_creation_list),
                )
                .route(
                    "/users/{uuid}/creation-statistic",
                    web::get().to(creations::get_creation_user_statistic),
                )
                .route("/me/collects", web::get().to(creations::get_collect_list))
                .route("/me/review-queue", web::get().to(creations::get_review_queue))
                .route("/leaderboard", web::get().to(creations::get_leaderboard)),
        )
        .service(
            web::scope("/internal/creations/{kind}/{id}")
                .route("/author", web::get().to(facade::author))
                .route("/counts", web::get().to(facade::counts))
                .route("/comment-count", web::post().to(facade::adjust_comment_count)),
        );
}
