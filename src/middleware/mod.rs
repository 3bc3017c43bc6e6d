// CORS and request logging middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
/// Handles OPTIONS preflight requests automatically.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware
///
/// Logs method, path, status and latency under a short request id.
/// The query string is left out: OAuth callbacks carry the authorization code there.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let request_id = &request_id[..8];
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    tracing::debug!("[{}] --> {} {}", request_id, method, path);

    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), latency_ms, "[{}] {} {}", request_id, method, path);
    } else if status.is_client_error() {
        tracing::warn!(status = status.as_u16(), latency_ms, "[{}] {} {}", request_id, method, path);
    } else {
        tracing::info!(status = status.as_u16(), latency_ms, "[{}] {} {}", request_id, method, path);
    }

    response
}
