//! HTTP client for webhook delivery.
//!
//! Handles request construction, signature headers, response snippet
//! capture, and error categorization for the retry logic. A non-2xx
//! response is returned to the caller for classification, not raised as
//! an error here.

use std::time::Duration;

use bytes::Bytes;
use skiff_core::models::DeliveryId;
use tracing::{debug, warn};

use crate::{
    error::{DeliveryError, Result},
    DELIVERY_TIMEOUT_SECONDS, RESPONSE_SNIPPET_CHARS,
};

/// Product identifier sent as the User-Agent on every delivery.
pub const USER_AGENT: &str = concat!("skiff/", env!("CARGO_PKG_VERSION"));

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hard timeout for one delivery attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DELIVERY_TIMEOUT_SECONDS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// One outbound delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Delivery being attempted.
    pub delivery_id: DeliveryId,
    /// Dotted event type, sent in `X-Webhook-Event`.
    pub event_type: String,
    /// Destination URL.
    pub url: String,
    /// Exact payload bytes as persisted on the delivery row.
    pub payload: Bytes,
    /// Precomputed `sha256=<hex>` signature header value.
    pub signature: String,
}

/// Outcome of a delivery attempt that reached the target.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated to the persisted snippet length.
    pub body: String,
    /// Whether the status was in the 2xx range.
    pub is_success: bool,
}

/// HTTP client for webhook POSTs.
///
/// Connection pooling is reused across attempts; the timeout applies to
/// the whole request including connect and body read.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a client with the default 10s timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Sends one signed webhook POST.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or `Network` when no response was obtained.
    /// Responses of any status are returned as `Ok`; the caller decides
    /// whether a non-2xx status terminates or retries the delivery.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        debug!(
            delivery_id = %request.delivery_id,
            event_type = %request.event_type,
            url = %request.url,
            "sending webhook delivery"
        );

        let response = self
            .client
            .post(&request.url)
            .header("content-type", "application/json")
            .header("x-webhook-signature", &request.signature)
            .header("x-webhook-event", &request.event_type)
            .header("x-webhook-delivery", request.delivery_id.to_string())
            .body(request.payload.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::timeout(self.config.timeout.as_secs())
                } else if e.is_connect() {
                    DeliveryError::network(format!("connection failed: {e}"))
                } else {
                    DeliveryError::network(e.to_string())
                }
            })?;

        let status_code = response.status().as_u16();
        let is_success = response.status().is_success();

        let body = match response.text().await {
            Ok(text) => truncate_snippet(&text),
            Err(e) => {
                warn!(delivery_id = %request.delivery_id, error = %e, "failed to read response body");
                String::new()
            },
        };

        debug!(
            delivery_id = %request.delivery_id,
            status = status_code,
            "received delivery response"
        );

        Ok(DeliveryResponse { status_code, body, is_success })
    }
}

/// Truncates a response body to the persisted snippet length.
fn truncate_snippet(body: &str) -> String {
    body.chars().take(RESPONSE_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request_for(url: String) -> DeliveryRequest {
        DeliveryRequest {
            delivery_id: DeliveryId::new(),
            event_type: "container.stopped".to_string(),
            url,
            payload: Bytes::from_static(b"{\"container_name\":\"web\"}"),
            signature: "sha256=deadbeef".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_delivery_returns_response() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("x-webhook-event", "container.stopped"))
            .and(matchers::header("x-webhook-signature", "sha256=deadbeef"))
            .and(matchers::header_exists("x-webhook-delivery"))
            .and(matchers::header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response =
            client.deliver(request_for(format!("{}/hook", mock_server.uri()))).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert!(response.is_success);
        assert_eq!(response.body, "OK");
    }

    #[tokio::test]
    async fn server_error_is_returned_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let response =
            client.deliver(request_for(format!("{}/hook", mock_server.uri()))).await.unwrap();

        assert_eq!(response.status_code, 500);
        assert!(!response.is_success);
        assert_eq!(response.body, "boom");
    }

    #[tokio::test]
    async fn connection_failure_is_a_network_error() {
        // Nothing listens on this port.
        let client = DeliveryClient::with_defaults().unwrap();
        let result = client.deliver(request_for("http://127.0.0.1:1/hook".to_string())).await;

        match result {
            Err(DeliveryError::Network { .. }) => {},
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[test]
    fn response_body_truncated_to_snippet_length() {
        let long_body = "x".repeat(5000);
        let snippet = truncate_snippet(&long_body);

        assert_eq!(snippet.len(), RESPONSE_SNIPPET_CHARS);
    }
}
