// Google Meet connector
// Meetings are Calendar events with a Meet conference attached

use axum::{
    extract::{rejection::BytesRejection, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{api_url, optional_json};
use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::http_client::ProviderClient;

const DEFAULT_SUMMARY: &str = "Google Meet AI Meeting";
const DEFAULT_DURATION_MINUTES: i64 = 60;
/// One week
const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;
/// Calendar accepts four-digit RFC 3339 years only
const MAX_EVENT_YEAR: i32 = 9999;
const DEFAULT_TIME_ZONE: &str = "UTC";
const NO_MEET_LINK: &str = "Meeting link not generated";

/// Optional body of `POST /create_meeting`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMeetingRequest {
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMeeting {
    pub meet_link: String,
    pub event_id: Option<String>,
}

pub struct MeetConnector {
    auth: Arc<AuthManager>,
    http: Arc<ProviderClient>,
    api_base: String,
}

impl MeetConnector {
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

    pub async fn create_meeting(
        &self,
        request: CreateMeetingRequest,
    ) -> Result<CreatedMeeting, ApiError> {
        let event = event_body(request, Utc::now())?;

        let token = self.auth.get_valid_token().await?;
        let url = api_url(
            &self.api_base,
            &["calendar", "v3", "calendars", "primary", "events"],
        )?;
        let request = self
            .http
            .client()
            .post(url)
            .query(&[("conferenceDataVersion", "1")])
            .bearer_auth(&token.access_token)
            .json(&event);

        let created = self
            .http
            .send_json(request, "Failed to create meeting")
            .await?;

        let meet_link = created
            .get("hangoutLink")
            .and_then(Value::as_str)
            .unwrap_or(NO_MEET_LINK)
            .to_string();
        let event_id = created.get("id").and_then(Value::as_str).map(str::to_string);

        tracing::info!("Created calendar event {:?}", event_id);
        Ok(CreatedMeeting {
            meet_link,
            event_id,
        })
    }

    /// Meet links of the primary calendar's events
    pub async fn list_meet_links(&self) -> Result<Vec<String>, ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(
            &self.api_base,
            &["calendar", "v3", "calendars", "primary", "events"],
        )?;
        let request = self.http.client().get(url).bearer_auth(&token.access_token);

        let events = self
            .http
            .send_json(request, "Failed to retrieve meetings")
            .await?;

        let links = events
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|event| event.get("hangoutLink").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(links)
    }
}

/// Calendar event insert body with a Meet conference request
fn event_body(request: CreateMeetingRequest, now: DateTime<Utc>) -> Result<Value, ApiError> {
    let duration = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    if !(1..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(ApiError::ValidationError(format!(
            "duration_minutes must be between 1 and {}, got {}",
            MAX_DURATION_MINUTES, duration
        )));
    }

    let start = request.start.unwrap_or(now + Duration::hours(1));
    let end = Duration::try_minutes(duration)
        .and_then(|length| start.checked_add_signed(length))
        .filter(|end| end.year() <= MAX_EVENT_YEAR)
        .ok_or_else(|| {
            ApiError::ValidationError(format!(
                "Meeting starting at {} ends after year {}",
                start.to_rfc3339(),
                MAX_EVENT_YEAR
            ))
        })?;
    let time_zone = request
        .time_zone
        .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());

    Ok(json!({
        "summary": request.summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        "start": { "dateTime": start.to_rfc3339(), "timeZone": time_zone },
        "end": { "dateTime": end.to_rfc3339(), "timeZone": time_zone },
        "conferenceData": {
            "createRequest": {
                "requestId": uuid::Uuid::new_v4().to_string(),
                "conferenceSolutionKey": { "type": "hangoutsMeet" }
            }
        }
    }))
}

pub fn routes(state: Arc<MeetConnector>) -> Router {
    Router::new()
        .route("/create_meeting", post(create_meeting_handler))
        .route("/meetings", get(meetings_handler))
        .with_state(state)
}

async fn create_meeting_handler(
    State(state): State<Arc<MeetConnector>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: CreateMeetingRequest = optional_json(&body?)?;
    let meeting = state.create_meeting(request).await?;

    Ok(Json(json!({
        "message": "Meeting Created",
        "meet_link": meeting.meet_link,
        "event_id": meeting.event_id
    })))
}

async fn meetings_handler(State(state): State<Arc<MeetConnector>>) -> Result<Json<Value>, ApiError> {
    let meet_links = state.list_meet_links().await?;
    Ok(Json(json!({
        "message": "Meetings Retrieved",
        "meet_links": meet_links
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::test_support::{authed_manager, http};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use mockito::Matcher;
    use tower::util::ServiceExt;

    fn connector(server_url: &str) -> MeetConnector {
        MeetConnector::new(
            authed_manager(server_url, "tok_cal"),
            http(),
            server_url.to_string(),
        )
    }

    #[test]
    fn test_event_body_defaults() {
        let now = Utc::now();
        let body = event_body(CreateMeetingRequest::default(), now).unwrap();

        assert_eq!(body["summary"], DEFAULT_SUMMARY);
        assert_eq!(body["start"]["timeZone"], "UTC");

        let start = DateTime::parse_from_rfc3339(body["start"]["dateTime"].as_str().unwrap()).unwrap();
        let end = DateTime::parse_from_rfc3339(body["end"]["dateTime"].as_str().unwrap()).unwrap();
        assert_eq!(start.with_timezone(&Utc), now + Duration::hours(1));
        assert_eq!(end - start, Duration::minutes(60));
        assert_eq!(
            body["conferenceData"]["createRequest"]["conferenceSolutionKey"]["type"],
            "hangoutsMeet"
        );
    }

    #[test]
    fn test_event_body_request_ids_are_unique() {
        let now = Utc::now();
        let a = event_body(CreateMeetingRequest::default(), now).unwrap();
        let b = event_body(CreateMeetingRequest::default(), now).unwrap();
        assert_ne!(
            a["conferenceData"]["createRequest"]["requestId"],
            b["conferenceData"]["createRequest"]["requestId"]
        );
    }

    #[test]
    fn test_event_body_rejects_non_positive_duration() {
        let request = CreateMeetingRequest {
            duration_minutes: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            event_body(request, Utc::now()),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_event_body_rejects_huge_duration() {
        for minutes in [MAX_DURATION_MINUTES + 1, i64::MAX] {
            let request = CreateMeetingRequest {
                duration_minutes: Some(minutes),
                ..Default::default()
            };
            assert!(matches!(
                event_body(request, Utc::now()),
                Err(ApiError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_event_body_accepts_one_week() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let request = CreateMeetingRequest {
            start: Some(start),
            duration_minutes: Some(MAX_DURATION_MINUTES),
            ..Default::default()
        };
        let body = event_body(request, Utc::now()).unwrap();
        assert_eq!(body["end"]["dateTime"], "2026-03-09T09:00:00+00:00");
    }

    #[test]
    fn test_event_body_rejects_end_past_year_9999() {
        let request = CreateMeetingRequest {
            start: Some(Utc.with_ymd_and_hms(9999, 12, 31, 23, 30, 0).unwrap()),
            ..Default::default()
        };
        match event_body(request, Utc::now()) {
            Err(ApiError::ValidationError(msg)) => assert!(msg.contains("9999")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    fn create_meeting_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create_meeting")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_meeting_route_rejects_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let calendar = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let app = routes(Arc::new(connector(&server.url())));

        for body in [r#"{"duration_minutes":"ninety"}"#, r#"{"summary":"#, r#"{"duration_minutes":9223372036854775807}"#] {
            let response = app.clone().oneshot(create_meeting_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let json: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(json["error"], "Validation error");
        }

        calendar.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_meeting_route_empty_body_uses_defaults() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({ "summary": DEFAULT_SUMMARY })))
            .with_status(200)
            .with_body(r#"{"id": "evt3", "hangoutLink": "https://meet.google.com/xyz"}"#)
            .create_async()
            .await;
        let app = routes(Arc::new(connector(&server.url())));

        let request = Request::builder()
            .method("POST")
            .uri("/create_meeting")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_meeting_returns_link() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::UrlEncoded(
                "conferenceDataVersion".to_string(),
                "1".to_string(),
            ))
            .match_header("authorization", "Bearer tok_cal")
            .match_body(Matcher::PartialJson(json!({ "summary": "Standup" })))
            .with_status(200)
            .with_body(r#"{"id": "evt1", "hangoutLink": "https://meet.google.com/abc-defg-hij"}"#)
            .create_async()
            .await;

        let meet = connector(&server.url());
        let created = meet
            .create_meeting(CreateMeetingRequest {
                summary: Some("Standup".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(created.meet_link, "https://meet.google.com/abc-defg-hij");
        assert_eq!(created.event_id.as_deref(), Some("evt1"));
    }

    #[tokio::test]
    async fn test_create_meeting_without_conference_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id": "evt2"}"#)
            .create_async()
            .await;

        let meet = connector(&server.url());
        let created = meet
            .create_meeting(CreateMeetingRequest::default())
            .await
            .unwrap();

        assert_eq!(created.meet_link, NO_MEET_LINK);
    }

    #[tokio::test]
    async fn test_list_meet_links_skips_events_without_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .with_status(200)
            .with_body(
                r#"{"items": [
                    {"id": "1", "hangoutLink": "https://meet.google.com/aaa"},
                    {"id": "2"},
                    {"id": "3", "hangoutLink": "https://meet.google.com/bbb"}
                ]}"#,
            )
            .create_async()
            .await;

        let meet = connector(&server.url());
        let links = meet.list_meet_links().await.unwrap();

        assert_eq!(
            links,
            vec!["https://meet.google.com/aaa", "https://meet.google.com/bbb"]
        );
    }
}
