/// Moderation callback intake
///
/// The reviewer posts its verdict here. The verdict is not acted on inline;
/// it is wrapped in a `comment_review_result` event so the result step gets
/// the bus's redelivery guarantees.
use super::AppState;
use crate::error::ServiceResult;
use crate::services::publish;
use actix_web::{web, HttpResponse};
use event_schema::{EventMode, ReviewResultEvent};
use tracing::info;

pub async fn review_result(
    state: web::Data<AppState>,
    verdict: web::Json<ReviewResultEvent>,
) -> ServiceResult<HttpResponse> {
    let verdict = verdict.into_inner();
    let envelope = publish(
        state.publisher.as_ref(),
        EventMode::CommentReviewResult,
        &verdict.job_id,
        &verdict,
    )
    .await?;
    info!(job_id = %verdict.job_id, passed = verdict.passed, event_id = %envelope.event_id, "Review verdict accepted");
    Ok(HttpResponse::Accepted().finish())
}
