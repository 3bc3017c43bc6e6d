use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::oauth::OAuthClient;
use super::store::TokenStore;
use super::types::{AuthorizationRequest, CallbackParams, TokenRecord};
use crate::error::ApiError;

/// How long an issued `state` stays valid for the callback
pub const STATE_TTL_SECS: i64 = 600;

/// Authentication manager
/// Owns the OAuth handshake and the token lifecycle for one provider
pub struct AuthManager {
    /// Provider-specific OAuth client
    oauth: OAuthClient,

    /// Where the token record lives
    store: Arc<dyn TokenStore>,

    /// CSRF states issued by `begin_authorization`, with issue time
    pending_states: DashMap<String, DateTime<Utc>>,

    /// Serializes refreshes so concurrent requests don't refresh twice
    refresh_lock: Mutex<()>,

    /// Refresh this many seconds before the recorded expiry
    refresh_threshold: i64,
}

impl AuthManager {
    pub fn new(oauth: OAuthClient, store: Arc<dyn TokenStore>, refresh_threshold: u64) -> Self {
        tracing::debug!(
            "Auth manager for {} using {} token store",
            oauth.endpoints().name,
            store.describe()
        );
        Self {
            oauth,
            store,
            pending_states: DashMap::new(),
            refresh_threshold: refresh_threshold as i64,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Provider name for logs and responses
    pub fn provider_name(&self) -> &str {
        &self.oauth.endpoints().name
    }

    /// Step 1: build the consent URL and remember its `state`
    pub fn begin_authorization(&self) -> anyhow::Result<AuthorizationRequest> {
        self.prune_states();

        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.oauth.authorization_url(&state)?;
        self.pending_states.insert(state.clone(), Utc::now());

        tracing::info!("Starting {} authorization", self.provider_name());
        Ok(AuthorizationRequest { url, state })
    }

    /// Step 2: validate the callback, exchange the code and persist the tokens
    pub async fn complete_authorization(
        &self,
        params: CallbackParams,
    ) -> Result<TokenRecord, ApiError> {
        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            tracing::warn!(
                "{} denied authorization: {} ({})",
                self.provider_name(),
                error,
                params.error_description.as_deref().unwrap_or("no description")
            );
            return Err(ApiError::AuthorizationDenied {
                error,
                description: params.error_description,
            });
        }

        let code = params
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ApiError::MissingAuthorizationCode)?;

        self.consume_state(params.state.as_deref())?;

        let record = self.oauth.exchange_code(code).await?;
        self.store.save(&record)?;

        Ok(record)
    }

    /// Current token, refreshed first if it is expiring and refreshable
    pub async fn get_valid_token(&self) -> Result<TokenRecord, ApiError> {
        let record = self.load()?.ok_or(ApiError::Unauthenticated)?;
        if !record.needs_refresh(self.refresh_threshold) {
            return Ok(record);
        }
        if record.refresh_token.is_none() {
            return Ok(Self::stale(record));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another request may have refreshed while we waited
        let record = self.load()?.ok_or(ApiError::Unauthenticated)?;
        if !record.needs_refresh(self.refresh_threshold) {
            return Ok(record);
        }
        if record.refresh_token.is_none() {
            return Ok(Self::stale(record));
        }

        let refreshed = self.oauth.refresh(&record).await?;
        self.persist(&refreshed)?;

        Ok(refreshed)
    }

    /// Write a record through to the store
    pub fn persist(&self, record: &TokenRecord) -> anyhow::Result<()> {
        self.store.save(record)
    }

    /// Read the stored record; `None` means no credentials yet
    pub fn load(&self) -> anyhow::Result<Option<TokenRecord>> {
        self.store.load()
    }

    /// Expired without a refresh token: hand it out and let the provider reject it
    fn stale(record: TokenRecord) -> TokenRecord {
        if record.is_expired() {
            tracing::warn!(
                "Access token {}... is expired and cannot be refreshed; re-run login",
                record.token_preview()
            );
        }
        record
    }

    fn consume_state(&self, state: Option<&str>) -> Result<(), ApiError> {
        let state = state.filter(|s| !s.is_empty()).ok_or_else(|| {
            tracing::warn!("OAuth callback without state parameter");
            ApiError::InvalidState
        })?;

        match self.pending_states.remove(state) {
            Some((_, issued_at)) if Utc::now() - issued_at <= Duration::seconds(STATE_TTL_SECS) => {
                Ok(())
            }
            Some(_) => {
                tracing::warn!("OAuth callback with expired state");
                Err(ApiError::InvalidState)
            }
            None => {
                tracing::warn!("OAuth callback with unknown state");
                Err(ApiError::InvalidState)
            }
        }
    }

    fn prune_states(&self) {
        let cutoff = Utc::now() - Duration::seconds(STATE_TTL_SECS);
        self.pending_states.retain(|_, issued_at| *issued_at > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{ClientAuth, ProviderEndpoints};
    use crate::auth::store::MemoryTokenStore;
    use crate::auth::types::ProviderMetadata;
    use mockito::Matcher;
    use reqwest::Client;

    fn manager(server_url: &str, store: Arc<dyn TokenStore>) -> AuthManager {
        let endpoints = ProviderEndpoints {
            name: "test".to_string(),
            authorize_url: format!("{}/authorize", server_url),
            token_url: format!("{}/token", server_url),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback".to_string(),
            scopes: vec!["files".to_string()],
            extra_authorize_params: Vec::new(),
            client_auth: ClientAuth::RequestBody,
            scope_on_exchange: false,
        };
        AuthManager::new(OAuthClient::new(endpoints, Client::new()), store, 60)
    }

    fn record(access_token: &str, expiry: DateTime<Utc>, refresh: Option<&str>) -> TokenRecord {
        TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: refresh.map(str::to_string),
            expiry: Some(expiry),
            scope: None,
            provider_metadata: ProviderMetadata::default(),
        }
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_authorization_persists_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::Regex("code=abc123".to_string()))
            .with_status(200)
            .with_body(r#"{"access_token":"tok_xyz","refresh_token":"ref","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let auth = manager(&server.url(), store.clone());

        let request = auth.begin_authorization().unwrap();
        let record = auth
            .complete_authorization(callback(Some("abc123"), Some(&request.state)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.access_token, "tok_xyz");
        assert_eq!(store.load().unwrap().unwrap().access_token, "tok_xyz");
    }

    #[tokio::test]
    async fn test_missing_code_never_contacts_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let auth = manager(&server.url(), Arc::new(MemoryTokenStore::new()));
        let request = auth.begin_authorization().unwrap();

        for code in [None, Some(""), Some("   ")] {
            let result = auth
                .complete_authorization(callback(code, Some(&request.state)))
                .await;
            assert!(matches!(result, Err(ApiError::MissingAuthorizationCode)));
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok_xyz"}"#)
            .expect(1)
            .create_async()
            .await;

        let auth = manager(&server.url(), Arc::new(MemoryTokenStore::new()));
        let request = auth.begin_authorization().unwrap();

        tokio_test::assert_ok!(
            auth.complete_authorization(callback(Some("code"), Some(&request.state)))
                .await
        );
        let replay = auth
            .complete_authorization(callback(Some("code"), Some(&request.state)))
            .await;
        assert!(matches!(replay, Err(ApiError::InvalidState)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_or_missing_state_rejected() {
        let auth = manager("http://127.0.0.1:9", Arc::new(MemoryTokenStore::new()));
        auth.begin_authorization().unwrap();

        let result = auth
            .complete_authorization(callback(Some("code"), Some("forged")))
            .await;
        assert!(matches!(result, Err(ApiError::InvalidState)));

        let result = auth.complete_authorization(callback(Some("code"), None)).await;
        assert!(matches!(result, Err(ApiError::InvalidState)));
    }

    #[tokio::test]
    async fn test_expired_state_rejected() {
        let auth = manager("http://127.0.0.1:9", Arc::new(MemoryTokenStore::new()));
        auth.pending_states.insert(
            "old".to_string(),
            Utc::now() - Duration::seconds(STATE_TTL_SECS + 1),
        );

        let result = auth
            .complete_authorization(callback(Some("code"), Some("old")))
            .await;
        assert!(matches!(result, Err(ApiError::InvalidState)));
    }

    #[tokio::test]
    async fn test_begin_authorization_prunes_old_states() {
        let auth = manager("http://127.0.0.1:9", Arc::new(MemoryTokenStore::new()));
        auth.pending_states.insert(
            "old".to_string(),
            Utc::now() - Duration::seconds(STATE_TTL_SECS + 1),
        );

        let request = auth.begin_authorization().unwrap();
        assert!(!auth.pending_states.contains_key("old"));
        assert!(auth.pending_states.contains_key(&request.state));
        assert!(request.url.contains(&request.state));
    }

    #[tokio::test]
    async fn test_provider_error_on_callback() {
        let auth = manager("http://127.0.0.1:9", Arc::new(MemoryTokenStore::new()));
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("User cancelled".to_string()),
            ..Default::default()
        };

        match auth.complete_authorization(params).await {
            Err(ApiError::AuthorizationDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("User cancelled"));
            }
            other => panic!("Expected AuthorizationDenied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_failure_not_persisted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let auth = manager(&server.url(), store.clone());
        let request = auth.begin_authorization().unwrap();

        let result = auth
            .complete_authorization(callback(Some("bad"), Some(&request.state)))
            .await;

        match result {
            Err(ApiError::TokenExchangeFailed { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"error":"invalid_grant"}"#);
            }
            other => panic!("Expected TokenExchangeFailed, got {:?}", other),
        }
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_record_is_unauthenticated_without_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let auth = manager(&server.url(), Arc::new(MemoryTokenStore::new()));
        let result = auth.get_valid_token().await;

        assert!(matches!(result, Err(ApiError::Unauthenticated)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fresh_token_returned_as_is() {
        let auth = manager("http://127.0.0.1:9", Arc::new(MemoryTokenStore::with_record(
            record("tok_fresh", Utc::now() + Duration::hours(1), Some("ref")),
        )));

        let token = auth.get_valid_token().await.unwrap();
        assert_eq!(token.access_token, "tok_fresh");
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_once_and_written_through() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("grant_type=refresh_token".to_string()),
                Matcher::Regex("refresh_token=ref_1".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"tok_new","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::with_record(record(
            "tok_old",
            Utc::now() - Duration::minutes(5),
            Some("ref_1"),
        )));
        let auth = manager(&server.url(), store.clone());

        let token = auth.get_valid_token().await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "tok_new");
        assert_eq!(token.refresh_token.as_deref(), Some("ref_1"));

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored, token);
    }

    #[tokio::test]
    async fn test_concurrent_expired_requests_refresh_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok_new","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::with_record(record(
            "tok_old",
            Utc::now() - Duration::minutes(5),
            Some("ref_1"),
        )));
        let auth = manager(&server.url(), store);

        let (a, b, c) = tokio::join!(
            auth.get_valid_token(),
            auth.get_valid_token(),
            auth.get_valid_token()
        );

        mock.assert_async().await;
        for token in [a, b, c] {
            assert_eq!(token.unwrap().access_token, "tok_new");
        }
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_returns_stale() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let stale = record("tok_stale", Utc::now() - Duration::minutes(5), None);
        let auth = manager(
            &server.url(),
            Arc::new(MemoryTokenStore::with_record(stale.clone())),
        );

        let token = auth.get_valid_token().await.unwrap();

        mock.assert_async().await;
        assert_eq!(token, stale);
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_unrefreshable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#)
            .create_async()
            .await;

        let original = record("tok_old", Utc::now() - Duration::minutes(5), Some("revoked"));
        let store = Arc::new(MemoryTokenStore::with_record(original.clone()));
        let auth = manager(&server.url(), store.clone());

        let result = auth.get_valid_token().await;

        assert!(matches!(
            result,
            Err(ApiError::TokenExpiredUnrefreshable { .. })
        ));
        assert_eq!(store.load().unwrap(), Some(original));
    }
}
