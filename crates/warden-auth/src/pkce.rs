//! OAuth 2.0 authorization-code + PKCE support for the portal's identity provider.
//!
//! Pure URL construction plus one SHA-256; the only I/O is the tab-scoped
//! verifier store.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};
use crate::store::{MemoryStore, PKCE_VERIFIER_KEY, SharedStore};

/// Length of generated verifiers.
pub const VERIFIER_LENGTH: usize = 64;

/// Unreserved characters allowed in a PKCE verifier (RFC 7636 §4.1).
const VERIFIER_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._~";

/// Bytes at or above this are rejected so every character is equally likely.
const REJECTION_LIMIT: u8 = (256 - 256 % VERIFIER_ALPHABET.len()) as u8;

/// Scopes requested when the config does not say otherwise.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Identity-provider settings (Keycloak realm layout).
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Provider base URL, e.g. `https://sso.example.com`.
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    /// Where the provider sends the browser back to.
    pub redirect_uri: String,
    pub scope: String,
}

impl OAuthConfig {
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    /// Override the requested scopes.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// `{base}/realms/{realm}/protocol/openid-connect/{leaf}`
    fn endpoint(&self, leaf: &str) -> Result<String> {
        if self.base_url.trim().is_empty() || self.realm.trim().is_empty() {
            return Err(AuthError::Config(
                "identity provider base_url and realm are required".to_string(),
            ));
        }
        Ok(format!(
            "{}/realms/{}/protocol/openid-connect/{}",
            self.base_url.trim_end_matches('/'),
            self.realm,
            leaf
        ))
    }

    /// Authorization endpoint URL.
    pub fn authorize_url(&self) -> Result<String> {
        self.endpoint("auth")
    }

    /// Logout endpoint URL.
    pub fn end_session_url(&self) -> Result<String> {
        self.endpoint("logout")
    }
}

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair from the OS random source.
    pub fn generate() -> Result<Self> {
        Ok(Self::from_verifier(random_verifier(VERIFIER_LENGTH)?))
    }

    /// Rebuild the pair for an existing verifier.
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// `base64url(SHA-256(verifier))` without padding.
pub fn compute_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_verifier(length: usize) -> Result<String> {
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| AuthError::CryptoUnavailable(e.to_string()))?;
        for &byte in buf.iter().filter(|b| **b < REJECTION_LIMIT) {
            out.push(VERIFIER_ALPHABET[byte as usize % VERIFIER_ALPHABET.len()] as char);
            if out.len() == length {
                break;
            }
        }
    }
    Ok(out)
}

fn encode_query<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds provider URLs and owns the pending verifier.
#[derive(Debug, Clone)]
pub struct PkceEngine {
    config: OAuthConfig,
    storage: SharedStore,
}

impl PkceEngine {
    /// Engine keeping its verifier in `storage` (should be tab-scoped).
    pub fn new(config: OAuthConfig, storage: SharedStore) -> Self {
        Self { config, storage }
    }

    /// Engine whose verifier lives for the lifetime of this process.
    pub fn in_memory(config: OAuthConfig) -> Self {
        Self::new(config, std::sync::Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Reuse the pending verifier or create and persist a new one.
    pub async fn ensure_challenge(&self) -> Result<PkceChallenge> {
        if let Some(verifier) = self
            .storage
            .get(PKCE_VERIFIER_KEY)
            .await?
            .filter(|v| !v.is_empty())
        {
            return Ok(PkceChallenge::from_verifier(verifier));
        }

        let pkce = PkceChallenge::generate()?;
        self.storage.set(PKCE_VERIFIER_KEY, &pkce.verifier).await?;
        tracing::debug!("Generated new PKCE verifier");
        Ok(pkce)
    }

    /// Authorization URL. `extra` is merged last and overrides defaults.
    pub async fn authorization_url<'a>(
        &self,
        extra: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<String> {
        let endpoint = self.config.authorize_url()?;
        let pkce = self.ensure_challenge().await?;

        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("scope", self.config.scope.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];
        for (key, value) in extra {
            match params.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => params.push((key, value)),
            }
        }

        Ok(format!("{}?{}", endpoint, encode_query(params)))
    }

    /// Plain sign-in URL.
    pub async fn login_url(&self) -> Result<String> {
        self.authorization_url([]).await
    }

    /// Sign-up URL: the authorization URL with the registration action.
    pub async fn register_url(&self) -> Result<String> {
        self.authorization_url([("kc_action", "register")]).await
    }

    /// Provider logout URL, returning to the redirect target afterwards.
    pub fn logout_url(&self) -> Result<String> {
        let endpoint = self.config.end_session_url()?;
        Ok(format!(
            "{}?{}",
            endpoint,
            encode_query([("post_logout_redirect_uri", self.config.redirect_uri.as_str())])
        ))
    }

    /// Remove and return the pending verifier. A verifier is good for one exchange.
    pub async fn take_verifier(&self) -> Result<Option<String>> {
        let verifier = self.storage.get(PKCE_VERIFIER_KEY).await?;
        self.storage.remove(PKCE_VERIFIER_KEY).await?;
        Ok(verifier.filter(|v| !v.is_empty()))
    }
}
