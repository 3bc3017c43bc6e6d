// Microsoft Teams connector (Graph API)

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::api_url;
use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::http_client::ProviderClient;

pub struct TeamsConnector {
    auth: Arc<AuthManager>,
    http: Arc<ProviderClient>,
    api_base: String,
}

impl TeamsConnector {
    pub fn new(auth: Arc<AuthManager>, http: Arc<ProviderClient>, api_base: String) -> Self {
        Self {
            auth,
            http,
            api_base,
        }
    }

    pub fn auth_manager(&self) -> Arc<AuthManager> {
        self.auth.clone()
    }

    /// GET a Graph resource and return its JSON unchanged
    pub async fn get(&self, segments: &[&str], action: &str) -> Result<Value, ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, segments)?;
        let request = self.http.client().get(url).bearer_auth(&token.access_token);

        self.http.send_json(request, action).await
    }

    pub async fn send_message(&self, chat_id: &str, message: &str) -> Result<Value, ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, &["chats", chat_id, "messages"])?;
        let request = self
            .http
            .client()
            .post(url)
            .bearer_auth(&token.access_token)
            .json(&json!({ "body": { "content": message } }));

        self.http.send_json(request, "Failed to send message").await
    }
}

pub fn routes(state: Arc<TeamsConnector>) -> Router {
    Router::new()
        .route("/me", get(me_handler))
        .route("/me/presence", get(presence_handler))
        .route("/me/chats", get(chats_handler))
        .route("/send_message/:chat_id", post(send_message_handler))
        .with_state(state)
}

async fn me_handler(State(state): State<Arc<TeamsConnector>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.get(&["me"], "Failed to fetch user profile").await?))
}

async fn presence_handler(
    State(state): State<Arc<TeamsConnector>>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(
        state
            .get(&["me", "presence"], "Failed to fetch presence")
            .await?,
    ))
}

async fn chats_handler(State(state): State<Arc<TeamsConnector>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.get(&["me", "chats"], "Failed to fetch chats").await?))
}

#[derive(Debug, Deserialize)]
struct SendMessageQuery {
    message: Option<String>,
}

/// POST /send_message/:chat_id?message=...
async fn send_message_handler(
    State(state): State<Arc<TeamsConnector>>,
    chat_id: Result<Path<String>, PathRejection>,
    query: Result<Query<SendMessageQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(chat_id) = chat_id?;
    let Query(query) = query?;
    let message = query
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("Query parameter 'message' is required".to_string()))?;

    Ok(Json(state.send_message(&chat_id, &message).await?))
}
