//! Client error types.

use thiserror::Error;

/// Fallback message when the backend gave us nothing readable.
pub const GENERIC_NETWORK_MESSAGE: &str = "Network error";

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// No response was received (connection refused, DNS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The backend rejected the credential (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The backend refused the action (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A credential could not be encoded as a header value.
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the backend response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Unauthorized(_) => Some(401),
            Error::Forbidden(_) => Some(403),
            Error::NotFound(_) => Some(404),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when no response was received at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Http(e) if e.status().is_none() && !e.is_decode())
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Unauthorized(_) | Error::Forbidden(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// The message a sign-in prompt should show: the backend's own text when we
    /// got one, otherwise a generic network message.
    pub fn user_message(&self) -> String {
        match self {
            Error::Api { message, .. }
            | Error::Unauthorized(message)
            | Error::Forbidden(message)
            | Error::NotFound(message) => message.clone(),
            _ => GENERIC_NETWORK_MESSAGE.to_string(),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pull a human-readable message out of a FastAPI-style error body.
///
/// Handles `{"detail": "..."}`, `{"detail": {"error_description": ...}}`,
/// `{"detail": {"error": ...}}` and falls back to the serialized detail.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            let trimmed = body.trim();
            return (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
    };

    let detail = match value.get("detail") {
        Some(d) => d,
        None => &value,
    };

    if let Some(s) = detail.as_str() {
        return Some(s.to_string());
    }
    for key in ["error_description", "error", "message"] {
        if let Some(s) = detail.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    if detail.is_null() {
        return None;
    }
    Some(detail.to_string())
}
