// Provider connectors
// Each connector forwards user-facing operations to one provider API

pub mod drive;
pub mod meet;
pub mod teams;
pub mod trello;
pub mod zoom;

use anyhow::{Context, Result};
use axum::Router;
use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{
    AuthManager, FileTokenStore, GoogleClientSecrets, MemoryTokenStore, OAuthClient,
    ProviderEndpoints, TokenStore,
};
use crate::config::{Config, ConnectorKind};
use crate::error::ApiError;
use crate::http_client::ProviderClient;

pub use drive::DriveConnector;
pub use meet::MeetConnector;
pub use teams::TeamsConnector;
pub use trello::TrelloConnector;
pub use zoom::ZoomConnector;

const DRIVE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive.file"];
const MEET_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar.events"];
const TEAMS_SCOPES: &[&str] = &[
    "User.Read",
    "Chat.ReadWrite",
    "Presence.Read",
    "Calendars.Read",
    "offline_access",
];

/// The connector served by this process
pub enum Connector {
    Drive(Arc<DriveConnector>),
    Teams(Arc<TeamsConnector>),
    Meet(Arc<MeetConnector>),
    Trello(Arc<TrelloConnector>),
    Zoom(Arc<ZoomConnector>),
}

impl Connector {
    /// Wire up the connector selected in `config`
    pub fn from_config(config: &Config, http: Arc<ProviderClient>) -> Result<Self> {
        let api_base = config.api_base.clone();

        let connector = match config.connector {
            ConnectorKind::Drive => {
                let auth = google_auth(config, DRIVE_SCOPES, &http)?;
                Connector::Drive(Arc::new(DriveConnector::new(
                    auth,
                    http,
                    api_base,
                    config.download_dir.clone(),
                )))
            }
            ConnectorKind::Meet => {
                let auth = google_auth(config, MEET_SCOPES, &http)?;
                Connector::Meet(Arc::new(MeetConnector::new(auth, http, api_base)))
            }
            ConnectorKind::Teams => {
                let endpoints = ProviderEndpoints::microsoft(
                    required(&config.tenant_id, "TENANT_ID")?,
                    required(&config.client_id, "CLIENT_ID")?,
                    required(&config.client_secret, "CLIENT_SECRET")?,
                    TEAMS_SCOPES,
                    &config.redirect_uri,
                );
                let auth = auth_manager(config, endpoints, &http);
                Connector::Teams(Arc::new(TeamsConnector::new(auth, http, api_base)))
            }
            ConnectorKind::Zoom => {
                let endpoints = ProviderEndpoints::zoom(
                    required(&config.client_id, "CLIENT_ID")?,
                    required(&config.client_secret, "CLIENT_SECRET")?,
                    &config.redirect_uri,
                );
                let auth = auth_manager(config, endpoints, &http);
                Connector::Zoom(Arc::new(ZoomConnector::new(auth, http, api_base)))
            }
            ConnectorKind::Trello => Connector::Trello(Arc::new(TrelloConnector::new(
                http,
                api_base,
                required(&config.trello_api_key, "TRELLO_API_KEY")?.to_string(),
                required(&config.trello_token, "TRELLO_TOKEN")?.to_string(),
            ))),
        };

        Ok(connector)
    }

    pub fn kind(&self) -> ConnectorKind {
        match self {
            Connector::Drive(_) => ConnectorKind::Drive,
            Connector::Teams(_) => ConnectorKind::Teams,
            Connector::Meet(_) => ConnectorKind::Meet,
            Connector::Trello(_) => ConnectorKind::Trello,
            Connector::Zoom(_) => ConnectorKind::Zoom,
        }
    }

    /// Credential manager, absent for connectors with static credentials
    pub fn auth_manager(&self) -> Option<Arc<AuthManager>> {
        match self {
            Connector::Drive(c) => Some(c.auth_manager()),
            Connector::Teams(c) => Some(c.auth_manager()),
            Connector::Meet(c) => Some(c.auth_manager()),
            Connector::Zoom(c) => Some(c.auth_manager()),
            Connector::Trello(_) => None,
        }
    }

    /// Operation routes for this connector
    pub fn routes(&self) -> Router {
        match self {
            Connector::Drive(c) => drive::routes(c.clone()),
            Connector::Teams(c) => teams::routes(c.clone()),
            Connector::Meet(c) => meet::routes(c.clone()),
            Connector::Trello(c) => trello::routes(c.clone()),
            Connector::Zoom(c) => zoom::routes(c.clone()),
        }
    }
}

fn google_auth(
    config: &Config,
    scopes: &[&str],
    http: &ProviderClient,
) -> Result<Arc<AuthManager>> {
    let secrets = GoogleClientSecrets::from_file(&config.client_secrets_file)?;
    let endpoints = ProviderEndpoints::google(secrets, scopes, &config.redirect_uri);
    Ok(auth_manager(config, endpoints, http))
}

fn auth_manager(
    config: &Config,
    endpoints: ProviderEndpoints,
    http: &ProviderClient,
) -> Arc<AuthManager> {
    let store: Arc<dyn TokenStore> = match &config.token_file {
        Some(path) => Arc::new(FileTokenStore::new(path.clone())),
        None => Arc::new(MemoryTokenStore::new()),
    };
    let oauth = OAuthClient::new(endpoints, http.client().clone());
    Arc::new(AuthManager::new(
        oauth,
        store,
        config.token_refresh_threshold,
    ))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("{} is not configured", name))
}

/// Provider URL for `base` plus path segments, each segment percent-encoded
pub(crate) fn api_url(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = Url::parse(base)
        .map_err(|e| ApiError::ConfigError(format!("Invalid API base {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::ConfigError(format!("API base cannot have a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Parse an optional JSON request body; an empty body yields the defaults
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::ValidationError(format!("Invalid JSON body: {}", e)))
}
