//! Error types shared across the crate.

use thiserror::Error;

/// Result type for all connection and entity operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connections, auth engines and entities.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials or endpoint configuration. Raised before any
    /// network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Handshake, verification or provider-reported authentication failure.
    /// Never retried silently; callers must restart the OAuth dance.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Opaque network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Structured error payload returned by the provider on a data call.
    #[error("API error: {0}")]
    Api(ApiFailure),

    /// Operation on an entity or collection without a usable connection
    /// reference (detached, or never attached).
    #[error("not connected to an API; reattach the entity to a connection first")]
    NotConnected,
}

/// Network-level failures from the transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status without a structured error payload.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable response body: {0}")]
    Body(String),
}

/// Error payload extracted from a provider response.
///
/// Providers disagree on the error envelope; the common shapes are
/// `{"error": {"message": ...}}`, `{"error": "...", "error_description": ...}`
/// and `{"errors": [{"message": ..., "code": ...}]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub message: String,
    pub code: Option<i64>,
}

impl ApiFailure {
    /// Scan a decoded response body for a provider error envelope.
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        let obj = body.as_object()?;

        if let Some(err) = obj.get("error") {
            // {"error": {"message": "...", "code": 190}}
            if let Some(map) = err.as_object() {
                let message = map
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unspecified error")
                    .to_string();
                let code = map.get("code").and_then(|c| c.as_i64());
                return Some(Self { message, code });
            }
            // {"error": "invalid_request", "error_description": "..."}
            if let Some(name) = err.as_str() {
                let message = obj
                    .get("error_description")
                    .and_then(|d| d.as_str())
                    .unwrap_or(name)
                    .to_string();
                return Some(Self {
                    message,
                    code: None,
                });
            }
        }

        // {"errors": [{"message": "...", "code": 34}]}
        if let Some(first) = obj.get("errors").and_then(|e| e.as_array()).and_then(|a| a.first()) {
            let message = first
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| first.as_str())
                .unwrap_or("unspecified error")
                .to_string();
            let code = first.get("code").and_then(|c| c.as_i64());
            return Some(Self { message, code });
        }

        None
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}
