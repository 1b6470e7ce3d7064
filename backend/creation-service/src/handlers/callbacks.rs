use super::AppState;
use crate::error::ServiceResult;
use crate::services::publish;
use actix_web::{web, HttpResponse};
use event_schema::{EventMode, ReviewResultEvent};
use tracing::info;

/// Reviewer verdict intake. The verdict is re-published as a
/// `creation_review_result` event and handled by the consumer.
pub async fn review_result(
    state: web::Data<AppState>,
    verdict: web::Json<ReviewResultEvent>,
) -> ServiceResult<HttpResponse> {
    let verdict = verdict.into_inner();
    publish(
        state.publisher.as_ref(),
        EventMode::CreationReviewResult,
        &verdict.job_id,
        &verdict,
    )
    .await?;
    info!(job_id = %verdict.job_id, passed = verdict.passed, "Creation review verdict accepted");
    Ok(HttpResponse::Accepted().finish())
}
