/// Comment handlers - HTTP endpoints for comments and replies
use super::{AppState, CallerId};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{CommentDraftRequest, SubCommentDraftRequest};
use actix_web::{web, HttpResponse};
use fanout_cache::Page;
use serde::Deserialize;
use serde_json::json;

/// Hard cap on ids per statistics request.
const MAX_STATISTIC_IDS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

impl PageQuery {
    fn page(&self) -> Page {
        match (self.page, self.size) {
            (None, None) => Page::default(),
            (page, size) => Page::new(page.unwrap_or(1), size.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatisticsRequest {
    pub ids: Vec<i64>,
}

pub async fn create_comment_draft(
    state: web::Data<AppState>,
    caller: CallerId,
    body: web::Json<CommentDraftRequest>,
) -> ServiceResult<HttpResponse> {
    let id = state.comments.create_comment_draft(&caller.0, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "draft_id": id })))
}

pub async fn create_sub_comment_draft(
    state: web::Data<AppState>,
    caller: CallerId,
    body: web::Json<SubCommentDraftRequest>,
) -> ServiceResult<HttpResponse> {
    let id = state
        .comments
        .create_sub_comment_draft(&caller.0, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(json!({ "draft_id": id })))
}

pub async fn create_comment(state: web::Data<AppState>, caller: CallerId) -> ServiceResult<HttpResponse> {
    let comment = state.comments.create_comment(&caller.0).await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn create_sub_comment(state: web::Data<AppState>, caller: CallerId) -> ServiceResult<HttpResponse> {
    let reply = state.comments.create_sub_comment(&caller.0).await?;
    Ok(HttpResponse::Created().json(reply))
}

pub async fn remove_comment(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    state.comments.remove_comment(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn remove_sub_comment(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    state
        .comments
        .remove_sub_comment(&caller.0, path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn set_comment_agree(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state
        .comments
        .set_comment_agree(&caller.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

pub async fn cancel_comment_agree(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state
        .comments
        .cancel_comment_agree(&caller.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

pub async fn get_comment_list(
    state: web::Data<AppState>,
    path: web::Path<(i16, i64)>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let (creation_type, creation_id) = path.into_inner();
    let items = state
        .comments
        .get_comment_list(creation_id, creation_type, query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_comment_hot_list(
    state: web::Data<AppState>,
    path: web::Path<(i16, i64)>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let (creation_type, creation_id) = path.into_inner();
    let items = state
        .comments
        .get_comment_hot_list(creation_id, creation_type, query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_sub_comment_list(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state
        .comments
        .get_sub_comment_list(path.into_inner(), query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_user_reply_list(
    state: web::Data<AppState>,
    caller: CallerId,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state.comments.get_user_reply_list(&caller.0, query.page()).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_user_replied_list(
    state: web::Data<AppState>,
    caller: CallerId,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state
        .comments
        .get_user_replied_list(&caller.0, query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_comment_statistics(
    state: web::Data<AppState>,
    body: web::Json<StatisticsRequest>,
) -> ServiceResult<HttpResponse> {
    if body.ids.len() > MAX_STATISTIC_IDS {
        return Err(ServiceError::ValidationFailed(format!(
            "at most {} ids per request",
            MAX_STATISTIC_IDS
        )));
    }
    let stats = state.comments.get_comment_statistics(&body.ids).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn get_user_comment_statistic(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let stat = state.comments.get_user_comment_statistic(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stat))
}

pub async fn get_review_queue(state: web::Data<AppState>, caller: CallerId) -> ServiceResult<HttpResponse> {
    let items = state.comments.get_review_queue(&caller.0).await?;
    Ok(HttpResponse::Ok().json(items))
}
