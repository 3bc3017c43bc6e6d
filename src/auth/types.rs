// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fields needed to refresh a token without consulting configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Token material for the single user of a connector process.
///
/// Persisted as one flat JSON object. `token` is accepted as an alias of
/// `access_token` so files written by older Google connectors still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(alias = "token")]
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(flatten)]
    pub provider_metadata: ProviderMetadata,
}

impl TokenRecord {
    /// Build a record from a token endpoint response
    pub fn from_response(response: TokenResponse, provider_metadata: ProviderMetadata) -> Self {
        let expiry = response.expiry_from_now();
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry,
            scope: response.scope,
            provider_metadata,
        }
    }

    /// Merge a refresh response into this record.
    /// Providers may omit `refresh_token` on refresh; the previous one is kept.
    pub fn apply_refresh(&mut self, response: TokenResponse) {
        self.expiry = response.expiry_from_now();
        self.access_token = response.access_token;
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if response.scope.is_some() {
            self.scope = response.scope;
        }
    }

    /// Check if the access token is past its expiry
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() >= expiry,
            // No expiry recorded: the provider issued a non-expiring token
            None => false,
        }
    }

    /// Check if the access token expires within `threshold_secs`
    pub fn needs_refresh(&self, threshold_secs: i64) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(threshold_secs) <= Utc::now(),
            None => false,
        }
    }

    /// Short token prefix safe to put in logs
    pub fn token_preview(&self) -> String {
        self.access_token.chars().take(8).collect()
    }
}

/// Standard OAuth2 token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    fn expiry_from_now(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

/// Query parameters the provider sends to the redirect URI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of starting an authorization: where to send the user
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}
