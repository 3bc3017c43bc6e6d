use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use crate::error::ApiError;

/// Shared HTTP client for provider API calls
///
/// Every call is issued exactly once: provider failures are reported to the
/// caller with the provider's own status and body, never retried.
pub struct ProviderClient {
    /// Shared HTTP client with connection pooling
    client: Client,
}

impl ProviderClient {
    /// Create a new HTTP client
    pub fn new(connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .user_agent(concat!("connector-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request; non-2xx becomes `ProviderRequestFailed` labelled `action`
    pub async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, ApiError> {
        let request = request
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(
            method = %method,
            url = %redact_query(&url),
            "Sending provider request"
        );

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_body() {
                    "body_error"
                } else {
                    "unknown"
                };

                tracing::error!(
                    error_kind = error_kind,
                    error = %e,
                    url = %redact_query(&url),
                    "Provider request error"
                );

                return Err(ApiError::Internal(anyhow::anyhow!(
                    "{}: HTTP request failed: {} (kind: {})",
                    action,
                    e,
                    error_kind
                )));
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = %status, "Provider request successful");
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            method = %method,
            url = %redact_query(&url),
            response_body = %error_text,
            "{}",
            action
        );

        Err(ApiError::provider(action, status.as_u16(), error_text))
    }

    /// Send a request and decode the JSON body; an empty body yields `null`
    pub async fn send_json(&self, request: RequestBuilder, action: &str) -> Result<Value, ApiError> {
        let response = self.send(request, action).await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("{}: failed to read response body", action))?;

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("{}: provider returned invalid JSON", action))?;
        Ok(value)
    }
}

/// URL for logs with query values masked (Trello passes credentials in the query)
fn redact_query(url: &reqwest::Url) -> String {
    let mut redacted = url.clone();
    if url.query().is_some() {
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        redacted
            .query_pairs_mut()
            .clear()
            .extend_pairs(keys.iter().map(|k| (k.as_str(), "***")));
    }
    redacted.to_string()
}
