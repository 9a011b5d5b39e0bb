//! Error types for webhook delivery operations.
//!
//! Categorizes every failure mode of an attempt so the worker can decide
//! between scheduling a retry and failing terminally.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions for webhook delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Error message describing the network failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds before the request timed out.
        timeout_seconds: u64,
    },

    /// The target responded outside the 2xx range.
    #[error("HTTP {status_code} response from target")]
    HttpStatus {
        /// HTTP status code returned by the target.
        status_code: u16,
    },

    /// The owning webhook no longer exists.
    #[error("webhook {webhook_id} no longer exists")]
    WebhookGone {
        /// Identifier of the missing webhook.
        webhook_id: String,
    },

    /// Database operation failed during delivery.
    #[error("database error: {message}")]
    Database {
        /// Database error message.
        message: String,
    },

    /// Invalid webhook configuration (URL, secret).
    #[error("invalid webhook configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an HTTP status error.
    pub fn http_status(status_code: u16) -> Self {
        Self::HttpStatus { status_code }
    }

    /// Creates a webhook-gone error.
    pub fn webhook_gone(webhook_id: impl Into<String>) -> Self {
        Self::WebhookGone { webhook_id: webhook_id.into() }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this failure should be retried while attempts remain.
    ///
    /// Network failures, timeouts, and any non-2xx response are
    /// retryable. A missing webhook or broken configuration is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::Database { .. } => true,
            Self::WebhookGone { .. } | Self::Configuration { .. } => false,
        }
    }

    /// HTTP status carried by this error, when the target responded.
    pub fn response_status(&self) -> Option<i32> {
        match self {
            Self::HttpStatus { status_code } => Some(i32::from(*status_code)),
            _ => None,
        }
    }
}
