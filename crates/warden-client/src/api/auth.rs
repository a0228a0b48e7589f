//! Auth API.

use crate::client::PortalClient;
use crate::error::Result;
use crate::types::{CodeExchangeRequest, IdentityClaims, LoginRequest, TokenResponse};

/// Where the backend accepts authorization codes for the PKCE flow.
pub const DEFAULT_EXCHANGE_PATH: &str = "auth/kc/exchange";

/// Auth API client.
pub struct AuthApi {
    client: PortalClient,
}

impl AuthApi {
    pub(crate) fn new(client: PortalClient) -> Self {
        Self { client }
    }

    /// Exchange email/password (and optionally a one-time code) for a token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<TokenResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            otp: otp.map(str::to_string),
        };
        self.client.post("auth/login", &request).await
    }

    /// Exchange an authorization code plus PKCE verifier through the backend.
    pub async fn exchange_code(
        &self,
        path: &str,
        request: &CodeExchangeRequest,
    ) -> Result<TokenResponse> {
        self.client.post(path, request).await
    }

    /// Fetch identity claims for the current credential.
    pub async fn me(&self) -> Result<IdentityClaims> {
        self.client.get("auth/kc/me").await
    }

    /// Tell the backend to end the session.
    pub async fn logout(&self) -> Result<()> {
        self.client.post_unit("auth/logout").await
    }
}
