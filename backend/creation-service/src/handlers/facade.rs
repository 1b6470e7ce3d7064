/// Internal façade for comment-service
///
/// Authors, counters and the idempotent comment-count adjustment. Not exposed
/// through the gateway.
use super::AppState;
use crate::error::ServiceResult;
use actix_web::{web, HttpResponse};
use event_schema::facade::CommentCountAdjustment;
use event_schema::CreationKind;
use tracing::debug;

pub async fn author(
    state: web::Data<AppState>,
    path: web::Path<(CreationKind, i64)>,
) -> ServiceResult<HttpResponse> {
    let (kind, id) = path.into_inner();
    let author = state.creations.author(kind, id).await?;
    Ok(HttpResponse::Ok().json(author))
}

pub async fn counts(
    state: web::Data<AppState>,
    path: web::Path<(CreationKind, i64)>,
) -> ServiceResult<HttpResponse> {
    let (kind, id) = path.into_inner();
    let counts = state.creations.counts(kind, id).await?;
    Ok(HttpResponse::Ok().json(counts))
}

pub async fn adjust_comment_count(
    state: web::Data<AppState>,
    path: web::Path<(CreationKind, i64)>,
    body: web::Json<CommentCountAdjustment>,
) -> ServiceResult<HttpResponse> {
    let (kind, id) = path.into_inner();
    let adjustment = body.into_inner();
    debug!(kind = %kind, creation_id = id, delta = adjustment.delta, key = %adjustment.idempotency_key, "Comment count adjustment");
    let result = state.creations.adjust_comment_count(kind, id, adjustment).await?;
    Ok(HttpResponse::Ok().json(result))
}
