// Zoom connector

use axum::{
    extract::{rejection::BytesRejection, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{api_url, optional_json};
use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::http_client::ProviderClient;

const DEFAULT_TOPIC: &str = "Zoom Meeting";
const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Zoom meeting types
const INSTANT_MEETING: u8 = 1;
const SCHEDULED_MEETING: u8 = 2;

/// Optional body of `POST /zoom/meeting`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateZoomMeetingRequest {
    pub topic: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub agenda: Option<String>,
    pub timezone: Option<String>,
}

pub struct ZoomConnector {
    auth: Arc<AuthManager>,
    http: Arc<ProviderClient>,
    api_base: String,
}

impl ZoomConnector {
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

    /// Create a meeting for the authenticated user
    pub async fn create_meeting(&self, request: CreateZoomMeetingRequest) -> Result<Value, ApiError> {
        let body = meeting_body(request)?;

        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, &["users", "me", "meetings"])?;
        let request = self
            .http
            .client()
            .post(url)
            .bearer_auth(&token.access_token)
            .json(&body);

        let meeting = self
            .http
            .send_json(request, "Failed to create Zoom meeting")
            .await?;
        tracing::info!("Created Zoom meeting {}", meeting["id"]);
        Ok(meeting)
    }
}

fn meeting_body(request: CreateZoomMeetingRequest) -> Result<Value, ApiError> {
    let duration = request.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    if duration == 0 {
        return Err(ApiError::ValidationError(
            "duration must be at least one minute".to_string(),
        ));
    }

    let mut body = json!({
        "topic": request.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        "type": INSTANT_MEETING,
        "duration": duration,
    });

    if let Some(start_time) = request.start_time {
        body["type"] = json!(SCHEDULED_MEETING);
        body["start_time"] = json!(start_time.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Some(agenda) = request.agenda {
        body["agenda"] = json!(agenda);
    }
    if let Some(timezone) = request.timezone {
        body["timezone"] = json!(timezone);
    }

    Ok(body)
}

pub fn routes(state: Arc<ZoomConnector>) -> Router {
    Router::new()
        .route("/zoom/meeting", post(create_meeting_handler))
        .with_state(state)
}

async fn create_meeting_handler(
    State(state): State<Arc<ZoomConnector>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: CreateZoomMeetingRequest = optional_json(&body?)?;
    let meeting = state.create_meeting(request).await?;

    Ok(Json(json!({
        "message": "Meeting created",
        "meeting_id": meeting["id"],
        "join_url": meeting["join_url"],
        "start_url": meeting["start_url"]
    })))
}
