// Provider endpoint descriptions
// One OAuth client serves every connector; only this data differs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ZOOM_AUTH_URI: &str = "https://zoom.us/oauth/authorize";
const ZOOM_TOKEN_URI: &str = "https://zoom.us/oauth/token";

/// How the client authenticates itself at the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` and `client_secret` as form fields (Google, Microsoft)
    RequestBody,

    /// HTTP Basic with `client_id:client_secret` (Zoom)
    BasicHeader,
}

/// Authorization and token endpoints plus client registration for one provider
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub name: String,
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,

    /// Appended to the authorization URL after the standard parameters
    pub extra_authorize_params: Vec<(String, String)>,

    pub client_auth: ClientAuth,

    /// Microsoft identity platform wants `scope` repeated on the code exchange
    pub scope_on_exchange: bool,
}

impl ProviderEndpoints {
    /// Google OAuth 2.0 from a downloaded client-secrets file
    pub fn google(secrets: GoogleClientSecrets, scopes: &[&str], redirect_uri: &str) -> Self {
        Self {
            name: "google".to_string(),
            authorize_url: secrets.auth_uri,
            token_url: secrets.token_uri,
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            redirect_uri: redirect_uri.to_string(),
            scopes: to_strings(scopes),
            // Offline access + forced consent so Google always returns a refresh token
            extra_authorize_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
            client_auth: ClientAuth::RequestBody,
            scope_on_exchange: false,
        }
    }

    /// Microsoft identity platform v2.0 for a single tenant
    pub fn microsoft(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        scopes: &[&str],
        redirect_uri: &str,
    ) -> Self {
        let base = format!("https://login.microsoftonline.com/{}/oauth2/v2.0", tenant_id);
        Self {
            name: "microsoft".to_string(),
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/token", base),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scopes: to_strings(scopes),
            extra_authorize_params: Vec::new(),
            client_auth: ClientAuth::RequestBody,
            scope_on_exchange: true,
        }
    }

    /// Zoom user-level OAuth app
    pub fn zoom(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            name: "zoom".to_string(),
            authorize_url: ZOOM_AUTH_URI.to_string(),
            token_url: ZOOM_TOKEN_URI.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            // Zoom grants the scopes configured on the app; none are requested
            scopes: Vec::new(),
            extra_authorize_params: Vec::new(),
            client_auth: ClientAuth::BasicHeader,
            scope_on_exchange: false,
        }
    }

    /// Space-separated scope list
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Client registration from a Google Cloud Console client-secrets file
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_google_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_google_token_uri")]
    pub token_uri: String,
}

fn default_google_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_google_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Downloaded files wrap the registration in `web` or `installed`
#[derive(Deserialize)]
struct ClientSecretsFile {
    web: Option<GoogleClientSecrets>,
    installed: Option<GoogleClientSecrets>,
}

impl GoogleClientSecrets {
    /// Load from a client-secrets JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "{} not found. Download it from Google Cloud Console.",
                path.display()
            )
        })?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid client secrets file: {}", path.display()))
    }

    /// Parse the contents of a client-secrets file
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(content).context("Failed to parse client secrets JSON")?;
        file.web
            .or(file.installed)
            .context("Client secrets must contain a \"web\" or \"installed\" section")
    }
}
