use super::{AppState, CallerId};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{CreationDraftRequest, CreationEditRequest};
use actix_web::{web, HttpResponse};
use event_schema::CreationKind;
use fanout_cache::Page;
use serde::Deserialize;
use serde_json::json;

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
        if self.page.is_none() && self.size.is_none() {
            return Page::default();
        }
        Page::new(self.page.unwrap_or(1), self.size.unwrap_or(0))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatisticsRequest {
    pub ids: Vec<i64>,
}

pub async fn create_draft(
    state: web::Data<AppState>,
    caller: CallerId,
    body: web::Json<CreationDraftRequest>,
) -> ServiceResult<HttpResponse> {
    let id = state.creations.create_draft(&caller.0, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "draft_id": id })))
}

/// Turn the caller's latest draft of this kind into a creation under review.
pub async fn create_creation(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<CreationKind>,
) -> ServiceResult<HttpResponse> {
    let creation = state
        .creations
        .create_creation(&caller.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(creation))
}

pub async fn edit_creation(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
    body: web::Json<CreationEditRequest>,
) -> ServiceResult<HttpResponse> {
    let creation = state
        .creations
        .edit_creation(&caller.0, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(creation))
}

pub async fn delete_creation(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    state.creations.delete_creation(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn set_agree(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state.creations.set_agree(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

pub async fn cancel_agree(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state.creations.cancel_agree(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

pub async fn set_collect(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state.creations.set_collect(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

pub async fn cancel_collect(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let changed = state.creations.cancel_collect(&caller.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "changed": changed })))
}

/// Views are counted for anonymous readers too.
pub async fn add_view(
    state: web::Data<AppState>,
    caller: Option<CallerId>,
    path: web::Path<i64>,
) -> ServiceResult<HttpResponse> {
    let uuid = caller.as_ref().map(|c| c.0.as_str());
    state.creations.add_view(uuid, path.into_inner()).await?;
    Ok(HttpResponse::Accepted().finish())
}

pub async fn get_creation_list(
    state: web::Data<AppState>,
    path: web::Path<CreationKind>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state
        .creations
        .get_creation_list(path.into_inner(), query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_creation_hot_list(
    state: web::Data<AppState>,
    path: web::Path<CreationKind>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state
        .creations
        .get_creation_hot_list(path.into_inner(), query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_user_creation_list(
    state: web::Data<AppState>,
    path: web::Path<(String, CreationKind)>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let (uuid, kind) = path.into_inner();
    let items = state
        .creations
        .get_user_creation_list(&uuid, kind, query.page())
        .await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_collect_list(
    state: web::Data<AppState>,
    caller: CallerId,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state.creations.get_collect_list(&caller.0, query.page()).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_leaderboard(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> ServiceResult<HttpResponse> {
    let items = state.creations.get_leaderboard(query.page()).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_creation_statistics(
    state: web::Data<AppState>,
    path: web::Path<CreationKind>,
    body: web::Json<StatisticsRequest>,
) -> ServiceResult<HttpResponse> {
    if body.ids.len() > MAX_STATISTIC_IDS {
        return Err(ServiceError::ValidationFailed(format!(
            "at most {} ids per request",
            MAX_STATISTIC_IDS
        )));
    }
    let stats = state
        .creations
        .get_creation_statistics(path.into_inner(), &body.ids)
        .await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn get_creation_user_statistic(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let stat = state
        .creations
        .get_creation_user_statistic(&path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(stat))
}

pub async fn get_review_queue(state: web::Data<AppState>, caller: CallerId) -> ServiceResult<HttpResponse> {
    let items = state.creations.get_review_queue(&caller.0).await?;
    Ok(HttpResponse::Ok().json(items))
}
