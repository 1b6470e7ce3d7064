use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

pub async fn ready() -> HttpResponse {
    HttpResponse::Ok().body("READY")
}

pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut body) {
        Ok(()) => HttpResponse::Ok().content_type(encoder.format_type()).body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
