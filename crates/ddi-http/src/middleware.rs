//! Middleware for DDI HTTP.
use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Logs method, path and response status of every request.
pub async fn log_request(request: Request<Body>, next: Next<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, path = %path, status = response.status().as_u16());
    response
}
