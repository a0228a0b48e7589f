//! Request signing.
//!
//! Every request leaves through [`CredentialTransport::decorate`], which attaches
//! exactly one credential: a bearer token when the session has one, otherwise the
//! CSRF nonce for state-mutating methods.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::cookie::CookieStore;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use reqwest::{Method, Request};
use url::Url;

use crate::error::{Error, Result};

/// Cookie the backend sets for the double-submit CSRF check.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Header carrying the CSRF nonce.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Read accessor for the current bearer token.
///
/// Called once per request; implementations must not assume the value is cached.
pub type TokenAccessor = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Build an accessor that always yields `token`.
pub fn fixed_token(token: impl Into<String>) -> TokenAccessor {
    let token: String = token.into();
    Arc::new(move || Some(token.clone()))
}

/// Anything that can look up a cookie value for a URL.
pub trait CookieSource: Send + Sync {
    /// Raw (still percent-encoded) value of the named cookie, if present.
    fn cookie_value(&self, url: &Url, name: &str) -> Option<String>;
}

impl<T: CookieStore> CookieSource for T {
    fn cookie_value(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.cookies(url)?;
        let header = header.to_str().ok()?;
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}

/// True for methods the backend guards with CSRF.
pub fn is_state_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Decorates outgoing requests with the appropriate credential.
pub struct CredentialTransport {
    accessor: RwLock<Option<TokenAccessor>>,
    cookies: Option<Arc<dyn CookieSource>>,
}

impl fmt::Debug for CredentialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialTransport")
            .field("has_accessor", &self.accessor.read().is_some())
            .field("has_cookies", &self.cookies.is_some())
            .finish()
    }
}

impl CredentialTransport {
    /// Transport without a cookie source; only bearer signing applies.
    pub fn new() -> Self {
        Self {
            accessor: RwLock::new(None),
            cookies: None,
        }
    }

    /// Transport that reads the CSRF cookie from `cookies`.
    pub fn with_cookies(cookies: Arc<dyn CookieSource>) -> Self {
        Self {
            accessor: RwLock::new(None),
            cookies: Some(cookies),
        }
    }

    /// Swap the token accessor. `None` means "no bearer credential".
    pub fn set_token_accessor(&self, accessor: Option<TokenAccessor>) {
        *self.accessor.write() = accessor;
    }

    /// Whether an accessor is currently installed.
    pub fn has_token_accessor(&self) -> bool {
        self.accessor.read().is_some()
    }

    /// Current bearer token, read through the accessor.
    fn current_token(&self) -> Option<String> {
        let accessor = self.accessor.read().clone()?;
        accessor().filter(|t| !t.is_empty())
    }

    /// Nonce half of the CSRF cookie for `url`.
    ///
    /// The cookie is `<nonce>.<server material>`; only the nonce is ever sent back.
    pub fn csrf_nonce(&self, url: &Url) -> Option<String> {
        let raw = self.cookies.as_ref()?.cookie_value(url, CSRF_COOKIE)?;
        let decoded = urlencoding::decode(&raw).ok()?;
        let nonce = decoded.split('.').next()?;
        (!nonce.is_empty()).then(|| nonce.to_string())
    }

    /// Attach the credential for this request.
    pub fn decorate(&self, request: &mut Request) -> Result<()> {
        if let Some(token) = self.current_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::InvalidHeader("Authorization"))?;
            let headers = request.headers_mut();
            headers.insert(AUTHORIZATION, value);
            headers.remove(CSRF_HEADER);
            return Ok(());
        }

        if !is_state_mutating(request.method()) {
            return Ok(());
        }

        match self.csrf_nonce(request.url()) {
            Some(nonce) => {
                let value = HeaderValue::from_str(&nonce)
                    .map_err(|_| Error::InvalidHeader("X-CSRF-Token"))?;
                request.headers_mut().insert(CSRF_HEADER, value);
            }
            None => {
                tracing::debug!(url = %request.url(), "No bearer token or CSRF cookie for mutating request");
            }
        }
        Ok(())
    }
}

impl Default for CredentialTransport {
    fn default() -> Self {
        Self::new()
    }
}
