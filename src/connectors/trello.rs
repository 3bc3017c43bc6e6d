// Trello connector
// Trello issues user tokens out-of-band; both key and token go in the query string

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::api_url;
use crate::error::ApiError;
use crate::http_client::ProviderClient;

/// Body of `POST /cards`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCardRequest {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "idList")]
    pub id_list: String,
}

pub struct TrelloConnector {
    http: Arc<ProviderClient>,
    api_base: String,
    api_key: String,
    token: String,
}

impl TrelloConnector {
    pub fn new(http: Arc<ProviderClient>, api_base: String, api_key: String, token: String) -> Self {
        Self {
            http,
            api_base,
            api_key,
            token,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.query(&[("key", &self.api_key), ("token", &self.token)])
    }

    pub async fn boards(&self) -> Result<Value, ApiError> {
        let url = api_url(&self.api_base, &["members", "me", "boards"])?;
        let request = self.authorize(self.http.client().get(url));
        self.http.send_json(request, "Failed to fetch boards").await
    }

    pub async fn lists(&self, board_id: &str) -> Result<Value, ApiError> {
        let url = api_url(&self.api_base, &["boards", board_id, "lists"])?;
        let request = self.authorize(self.http.client().get(url));
        self.http.send_json(request, "Failed to fetch lists").await
    }

    pub async fn cards(&self, list_id: &str) -> Result<Value, ApiError> {
        let url = api_url(&self.api_base, &["lists", list_id, "cards"])?;
        let request = self.authorize(self.http.client().get(url));
        self.http.send_json(request, "Failed to fetch cards").await
    }

    pub async fn create_card(&self, card: &CreateCardRequest) -> Result<Value, ApiError> {
        let url = api_url(&self.api_base, &["cards"])?;
        let request = self.authorize(self.http.client().post(url)).query(&[
            ("idList", card.id_list.as_str()),
            ("name", card.name.as_str()),
            ("desc", card.desc.as_str()),
        ]);
        self.http.send_json(request, "Failed to create card").await
    }
}

pub fn routes(state: Arc<TrelloConnector>) -> Router {
    Router::new()
        .route("/boards", get(boards_handler))
        .route("/lists/:board_id", get(lists_handler))
        .route("/cards", post(create_card_handler))
        .route("/cards/:list_id", get(cards_handler))
        .with_state(state)
}

async fn boards_handler(State(state): State<Arc<TrelloConnector>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.boards().await?))
}

async fn lists_handler(
    State(state): State<Arc<TrelloConnector>>,
    board_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(board_id) = board_id?;
    Ok(Json(state.lists(&board_id).await?))
}

async fn cards_handler(
    State(state): State<Arc<TrelloConnector>>,
    list_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(list_id) = list_id?;
    Ok(Json(state.cards(&list_id).await?))
}

async fn create_card_handler(
    State(state): State<Arc<TrelloConnector>>,
    card: Result<Json<CreateCardRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(card) = card?;
    if card.name.trim().is_empty() {
        return Err(ApiError::ValidationError("Card name cannot be empty".to_string()));
    }
    Ok(Json(state.create_card(&card).await?))
}
