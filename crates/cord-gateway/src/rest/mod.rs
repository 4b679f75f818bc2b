//! REST lookup of the gateway endpoint.

use serde::Deserialize;
use thiserror::Error;

/// Base URL of the HTTP API.
pub const API_BASE: &str = "https://discord.com/api/v6";

/// REST errors
#[derive(Debug, Error)]
pub enum RestError {
    /// The HTTP request failed
    #[error("gateway endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("gateway endpoint returned status {0}")]
    Status(u16),
}

/// Response body of `GET /gateway`.
#[derive(Debug, Deserialize)]
pub struct GatewayEndpoint {
    /// Websocket URL to connect to
    pub url: String,
}

/// Minimal REST client; the gateway only ever asks it one question.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: String,
}

impl RestClient {
    /// Client against the production API.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(API_BASE)
    }

    /// Client against a custom API base (used by tests).
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    /// Fetch the websocket URL for the gateway.
    ///
    /// The response body is decoded before the URL is returned, so a
    /// successful call always yields the URL the server actually sent.
    pub async fn gateway_url(&self) -> Result<String, RestError> {
        let response = self.http.get(format!("{}/gateway", self.base)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status(status.as_u16()));
        }

        let endpoint: GatewayEndpoint = response.json().await?;
        Ok(endpoint.url)
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_endpoint_decodes_url() {
        // The endpoint body must be decoded into the struct; returning the
        // field without decoding would always yield an empty URL.
        let endpoint: GatewayEndpoint =
            serde_json::from_str(r#"{"url":"wss://gateway.discord.gg"}"#).unwrap();
        assert_eq!(endpoint.url, "wss://gateway.discord.gg");
        assert!(!endpoint.url.is_empty());
    }

    #[test]
    fn test_status_error_display() {
        let err = RestError::Status(502);
        assert!(err.to_string().contains("502"));
    }
}
