use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

pub async fn ready() -> HttpResponse {
    HttpResponse::Ok().body("READY")
}

/// Render the default registry in the text exposition format.
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
