// OAuth2 authorization-code client
// Builds consent URLs and talks to the provider token endpoint

use anyhow::Context;
use reqwest::{Client, RequestBuilder, Url};

use super::provider::{ClientAuth, ProviderEndpoints};
use super::types::{ProviderMetadata, TokenRecord, TokenResponse};
use crate::error::ApiError;

/// Generic OAuth2 client parameterized by provider endpoints
pub struct OAuthClient {
    endpoints: ProviderEndpoints,
    client: Client,
}

impl OAuthClient {
    pub fn new(endpoints: ProviderEndpoints, client: Client) -> Self {
        Self { endpoints, client }
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Build the consent-screen URL for the given CSRF `state`
    pub fn authorization_url(&self, state: &str) -> anyhow::Result<String> {
        let scope = self.endpoints.scope_param();
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", self.endpoints.client_id.as_str()),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("response_type", "code"),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }
        params.push(("state", state));
        for (key, value) in &self.endpoints.extra_authorize_params {
            params.push((key.as_str(), value.as_str()));
        }

        let url = Url::parse_with_params(&self.endpoints.authorize_url, &params).with_context(
            || format!("Invalid authorize URL: {}", self.endpoints.authorize_url),
        )?;
        Ok(url.to_string())
    }

    /// Exchange a one-time authorization code for a token record
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord, ApiError> {
        tracing::info!("Exchanging authorization code with {}...", self.endpoints.name);

        let scope = self.endpoints.scope_param();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
        ];
        if self.endpoints.scope_on_exchange && !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let request = self.token_request(
            &self.endpoints.token_url,
            &self.endpoints.client_id,
            &self.endpoints.client_secret,
            form,
        );

        let response = request
            .send()
            .await
            .context("Failed to send authorization code exchange request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = %self.endpoints.name,
                status = status.as_u16(),
                body = %body,
                "Authorization code exchange failed"
            );
            return Err(ApiError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let data: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token exchange response")?;
        if data.access_token.is_empty() {
            return Err(anyhow::anyhow!("Token exchange response does not contain access_token").into());
        }

        let record = TokenRecord::from_response(data, self.metadata());
        tracing::info!(
            "Authorization complete for {} (token: {}..., expires: {})",
            self.endpoints.name,
            record.token_preview(),
            record
                .expiry
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );

        Ok(record)
    }

    /// Refresh an expired record, returning the updated copy.
    ///
    /// Endpoint and client credentials come from the record's own metadata
    /// when present, so a token file outlives configuration changes.
    pub async fn refresh(&self, record: &TokenRecord) -> Result<TokenRecord, ApiError> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .ok_or_else(|| ApiError::TokenExpiredUnrefreshable {
                details: "No refresh token available".to_string(),
            })?;

        let meta = &record.provider_metadata;
        let token_url = meta.token_uri.as_deref().unwrap_or(&self.endpoints.token_url);
        let client_id = meta.client_id.as_deref().unwrap_or(&self.endpoints.client_id);
        let client_secret = meta
            .client_secret
            .as_deref()
            .unwrap_or(&self.endpoints.client_secret);

        tracing::info!("Refreshing {} access token...", self.endpoints.name);
        tracing::debug!(
            "Refresh request: url={}, client_id={}...",
            token_url,
            client_id.get(..8).unwrap_or(client_id)
        );

        let form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .token_request(token_url, client_id, client_secret, form)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = %self.endpoints.name,
                status = status.as_u16(),
                body = %body,
                "Token refresh failed"
            );
            return Err(ApiError::TokenExpiredUnrefreshable { details: body });
        }

        let data: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        let mut refreshed = record.clone();
        refreshed.apply_refresh(data);

        tracing::info!(
            "Token refreshed for {}, expires: {}",
            self.endpoints.name,
            refreshed
                .expiry
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );

        Ok(refreshed)
    }

    /// Metadata stored alongside new tokens so refresh is self-contained
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            token_uri: Some(self.endpoints.token_url.clone()),
            client_id: Some(self.endpoints.client_id.clone()),
            client_secret: Some(self.endpoints.client_secret.clone()),
        }
    }

    /// Form-encoded token endpoint request with the provider's client auth
    fn token_request<'a>(
        &self,
        url: &str,
        client_id: &'a str,
        client_secret: &'a str,
        mut form: Vec<(&'a str, &'a str)>,
    ) -> RequestBuilder {
        let builder = self.client.post(url).header("Accept", "application/json");
        match self.endpoints.client_auth {
            ClientAuth::RequestBody => {
                form.push(("client_id", client_id));
                form.push(("client_secret", client_secret));
                builder.form(&form)
            }
            ClientAuth::BasicHeader => builder
                .basic_auth(client_id, Some(client_secret))
                .form(&form),
        }
    }
}
