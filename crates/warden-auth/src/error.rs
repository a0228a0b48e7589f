//! Error types for sign-in and session handling.

use warden_client::{Error as ClientError, GENERIC_NETWORK_MESSAGE};

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Markers that make a backend message read as "needs a one-time code".
///
/// Matching free text is a stopgap until the backend returns a structured code;
/// it only decides whether to re-prompt, never whether to grant access.
const SECOND_FACTOR_MARKERS: &[&str] = &["otp", "totp", "authenticator", "two-factor", "2fa"];

/// Errors that can occur while authenticating or using a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Email/password rejected.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The account needs a one-time code; re-prompt and retry with `otp`.
    #[error("Second factor required: {0}")]
    SecondFactorRequired(String),

    /// No response from the backend.
    #[error("Network error: {0}")]
    Network(String),

    /// The stored token was rejected by the identity-claims endpoint.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The OS random source failed. Fatal.
    #[error("Secure random source unavailable: {0}")]
    CryptoUnavailable(String),

    /// A sign-in attempt is already running.
    #[error("Another sign-in attempt is already in progress")]
    SessionBusy,

    /// An authenticated call was rejected (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An authenticated call was refused (403), or the local capability check failed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The callback arrived but no verifier is pending.
    #[error("No pending PKCE verifier; start the authorization flow again")]
    MissingVerifier,

    /// Any other non-success answer from the backend or identity provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Persisting or reading local state failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<ClientError> for AuthError {
    fn from(e: ClientError) -> Self {
        if e.is_network() {
            return AuthError::Network(e.to_string());
        }
        match e {
            ClientError::Unauthorized(msg) => AuthError::Unauthorized(msg),
            ClientError::Forbidden(msg) => AuthError::Forbidden(msg),
            ClientError::Config(msg) => AuthError::Config(msg),
            ClientError::InvalidUrl(e) => AuthError::Config(e.to_string()),
            other => match other.status() {
                Some(_) => AuthError::Backend(other.user_message()),
                None => AuthError::Backend(other.to_string()),
            },
        }
    }
}

impl AuthError {
    /// Classify a failed token request (direct grant or code exchange).
    pub fn from_login_failure(e: ClientError) -> Self {
        if e.is_network() {
            return AuthError::Network(e.to_string());
        }
        let message = e.user_message();
        if looks_like_second_factor(&message) {
            return AuthError::SecondFactorRequired(message);
        }
        match e.status() {
            Some(400) | Some(401) => AuthError::InvalidCredentials(message),
            _ => AuthError::from(e),
        }
    }

    /// Classify a failed identity-claims fetch.
    pub fn from_claims_failure(e: ClientError) -> Self {
        match e.status() {
            Some(401) | Some(403) => AuthError::SessionExpired(e.user_message()),
            _ => AuthError::from(e),
        }
    }

    /// True when the caller should ask for a one-time code and retry.
    pub fn needs_second_factor(&self) -> bool {
        matches!(self, AuthError::SecondFactorRequired(_))
    }

    /// Message suitable for a sign-in prompt: the backend's text when there is
    /// one, a generic network message otherwise.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(m)
            | AuthError::SecondFactorRequired(m)
            | AuthError::SessionExpired(m)
            | AuthError::Unauthorized(m)
            | AuthError::Forbidden(m)
            | AuthError::Backend(m) => m.clone(),
            AuthError::Network(_) => GENERIC_NETWORK_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Whether a backend message asks for a second factor.
pub fn looks_like_second_factor(message: &str) -> bool {
    let lower = message.to_lowercase();
    SECOND_FACTOR_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_factor_markers() {
        assert!(looks_like_second_factor("OTP required"));
        assert!(looks_like_second_factor("Invalid TOTP code"));
        assert!(looks_like_second_factor("Use your Authenticator app"));
        assert!(looks_like_second_factor("two-factor authentication needed"));
        assert!(looks_like_second_factor("2FA"));
        assert!(!looks_like_second_factor("Invalid credentials"));
    }

    #[test]
    fn test_login_failure_classification() {
        let err = AuthError::from_login_failure(ClientError::Unauthorized(
            "Invalid credentials".to_string(),
        ));
        assert!(matches!(err, AuthError::InvalidCredentials(_)));

        let err = AuthError::from_login_failure(ClientError::Api {
            status: 400,
            message: "OTP required".to_string(),
        });
        assert!(err.needs_second_factor());
        assert_eq!(err.user_message(), "OTP required");

        let err = AuthError::from_login_failure(ClientError::Api {
            status: 502,
            message: "upstream down".to_string(),
        });
        assert!(matches!(err, AuthError::Backend(ref m) if m == "upstream down"));
    }

    #[test]
    fn test_claims_failure_is_session_expired() {
        let err = AuthError::from_claims_failure(ClientError::Unauthorized("expired".into()));
        assert!(matches!(err, AuthError::SessionExpired(_)));

        let err = AuthError::from_claims_failure(ClientError::Forbidden("nope".into()));
        assert!(matches!(err, AuthError::SessionExpired(_)));
    }

    #[test]
    fn test_generic_mapping() {
        assert!(matches!(
            AuthError::from(ClientError::Forbidden("x".into())),
            AuthError::Forbidden(_)
        ));
        assert!(matches!(
            AuthError::from(ClientError::NotFound("x".into())),
            AuthError::Backend(_)
        ));
    }
}
