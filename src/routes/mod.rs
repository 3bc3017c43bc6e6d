use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AuthManager, CallbackParams};
use crate::config::ConnectorKind;
use crate::connectors::Connector;
use crate::error::ApiError;
use crate::middleware;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the application with all routes and middleware
pub fn build_app(connector: &Connector) -> Router {
    let kind = connector.kind();

    let mut app = Router::new()
        .merge(health_routes(kind))
        .merge(connector.routes());

    if let Some(auth) = connector.auth_manager() {
        app = app.merge(auth_routes(auth, kind));
    }

    app.layer(middleware::cors_layer())
        .layer(axum::middleware::from_fn(middleware::request_logging))
}

/// Health check routes
pub fn health_routes(kind: ConnectorKind) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(kind)
}

/// OAuth handshake routes: consent redirect and code exchange
pub fn auth_routes(auth: Arc<AuthManager>, kind: ConnectorKind) -> Router {
    Router::new()
        .route(kind.login_path(), get(login_handler))
        .route(kind.callback_path(), get(callback_handler))
        .with_state(auth)
}

/// GET / - Simple liveness check
async fn root_handler(State(kind): State<ConnectorKind>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": format!("{} Connector API is running!", kind.display_name()),
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler(State(kind): State<ConnectorKind>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "connector": kind.display_name(),
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// GET /login - Redirect to the provider's consent screen
async fn login_handler(State(auth): State<Arc<AuthManager>>) -> Result<Redirect, ApiError> {
    let request = auth.begin_authorization()?;
    Ok(Redirect::to(&request.url))
}

/// GET /auth/callback - Exchange the authorization code for tokens
async fn callback_handler(
    State(auth): State<Arc<AuthManager>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<Value>, ApiError> {
    let record = auth.complete_authorization(params).await?;

    tracing::info!(
        "✅ {} authentication successful (token: {}...)",
        auth.provider_name(),
        record.token_preview()
    );

    Ok(Json(json!({
        "message": "Authentication successful!",
        "access_token": record.access_token
    })))
}
